//! Breakpoint bookkeeping: committed breakpoints per URL, pending breakpoints
//! waiting for their script to parse, hit-condition state and the
//! serialization discipline for set operations.

use crate::adapter::TargetCx;
use crate::adapter::handles::ReverseHandleTable;
use crate::adapter::scripts::ScriptRegistry;
use crate::cdp::types::{BreakpointResolvedEvent, Location};
use crate::dap::requests::{SetBreakpointsArguments, SetBreakpointsResponseBody, SourceBreakpoint};
use crate::dap::types::Breakpoint;
use crate::error::Error;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Overall deadline for one queued clear+add sequence.
pub const SET_BREAKPOINTS_TIMEOUT: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HitOp {
    Gt,
    Ge,
    Eq,
    Lt,
    Le,
    Mod,
}

/// A compiled hit-condition expression, `(>|>=|=|<|<=|%)? \s* [0-9]+`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitCondition {
    op: HitOp,
    k: u64,
}

static HIT_CONDITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(>|>=|=|<|<=|%)?\s*([0-9]+)\s*$").expect("infallible"));

impl HitCondition {
    pub fn parse(expression: &str) -> Result<HitCondition, Error> {
        let captures = HIT_CONDITION_RE
            .captures(expression)
            .ok_or_else(|| Error::InvalidHitCondition(expression.to_string()))?;

        let op = match captures.get(1).map(|m| m.as_str()) {
            Some(">") => HitOp::Gt,
            Some(">=") | None => HitOp::Ge,
            Some("=") => HitOp::Eq,
            Some("<") => HitOp::Lt,
            Some("<=") => HitOp::Le,
            Some("%") => HitOp::Mod,
            Some(_) => unreachable!("covered by the pattern"),
        };
        let k: u64 = captures[2]
            .parse()
            .map_err(|_| Error::InvalidHitCondition(expression.to_string()))?;

        Ok(HitCondition { op, k })
    }

    pub fn should_pause(&self, num_hits: u64) -> bool {
        match self.op {
            HitOp::Gt => num_hits > self.k,
            HitOp::Ge => num_hits >= self.k,
            HitOp::Eq => num_hits == self.k,
            HitOp::Lt => num_hits < self.k,
            HitOp::Le => num_hits <= self.k,
            HitOp::Mod => self.k != 0 && num_hits % self.k == 0,
        }
    }
}

/// Hit counter attached to a committed CDP breakpoint.
#[derive(Debug, Clone)]
pub struct HitConditionBreakpoint {
    pub num_hits: u64,
    pub condition: HitCondition,
}

/// A setBreakpoints request that arrived before its script was parsed (or
/// before its source map resolved). Consumed exactly once when the script
/// appears.
#[derive(Clone)]
pub struct PendingBreakpoint {
    pub args: SetBreakpointsArguments,
    pub ids: Vec<i64>,
    pub request_seq: i64,
}

/// Normalized result of the two CDP add commands.
struct AddResult {
    breakpoint_id: String,
    actual_location: Option<Location>,
}

pub struct BreakpointManager {
    committed_by_url: IndexMap<String, Vec<String>>,
    pending_by_path: IndexMap<String, PendingBreakpoint>,
    hit_conditions: HashMap<String, HitConditionBreakpoint>,
    /// Client-visible breakpoint ids, bound to CDP breakpoint ids once known.
    ids: ReverseHandleTable<String>,
    in_flight: bool,
}

impl Default for BreakpointManager {
    fn default() -> Self {
        Self {
            committed_by_url: IndexMap::new(),
            pending_by_path: IndexMap::new(),
            hit_conditions: HashMap::new(),
            ids: ReverseHandleTable::new(1),
            in_flight: false,
        }
    }
}

impl BreakpointManager {
    /// Handle a client setBreakpoints request.
    ///
    /// `existing_ids` carries the ids minted when the request was first
    /// answered unverified; resolution must emit the same ids.
    pub fn set_breakpoints(
        &mut self,
        cx: &mut TargetCx<'_>,
        args: &SetBreakpointsArguments,
        request_seq: i64,
        existing_ids: Option<Vec<i64>>,
    ) -> Result<SetBreakpointsResponseBody, Error> {
        let Some(authored_path) = args.source.path.clone() else {
            // a sourceReference-only source can never bind on the target
            return Ok(self.unverified_response(args, request_seq, existing_ids, "source has no path"));
        };

        // client coordinates -> debugger coordinates, authored -> generated
        let mut target_url = None;
        let mut locations = Vec::with_capacity(args.breakpoints.len());
        for bp in &args.breakpoints {
            let line = cx.lines.to_debugger_line(bp.line);
            let column = cx.lines.to_debugger_column(bp.column.unwrap_or(0));

            match cx.sourcemaps.authored_to_generated(&authored_path, line, column) {
                Some(generated) => {
                    target_url.get_or_insert_with(|| generated.url.clone());
                    locations.push((generated.line, generated.column));
                }
                None => locations.push((line, column)),
            }
        }

        let target_url = target_url.or_else(|| cx.paths.client_path_to_target_url(&authored_path));
        let Some(url) = target_url else {
            log::debug!(
                target: "adapter",
                "no target for {authored_path} yet, breakpoints stay pending"
            );
            return Ok(self.unverified_response(
                args,
                request_seq,
                existing_ids,
                &Error::BreakpointIgnoredNoTargetPath(authored_path.clone()).to_string(),
            ));
        };

        let ids = existing_ids.unwrap_or_else(|| self.mint_ids(&authored_path, request_seq, args.breakpoints.len()));

        // one clear+add sequence per target at a time, whole sequence under a deadline
        debug_assert!(!self.in_flight, "setBreakpoints operations must be serialized");
        self.in_flight = true;
        let result = self.replace_breakpoints(cx, &url, &args.breakpoints, &locations, &ids);
        self.in_flight = false;

        result
    }

    /// Register a pending record so the request can be replayed once the
    /// script (or its source map) appears.
    pub fn add_pending(&mut self, args: &SetBreakpointsArguments, request_seq: i64, ids: Vec<i64>) {
        let Some(path) = args.source.path.as_deref() else {
            return;
        };
        let key = ScriptRegistry::normalize_url(path);
        self.pending_by_path.insert(
            key,
            PendingBreakpoint {
                args: args.clone(),
                ids,
                request_seq,
            },
        );
    }

    /// Remove and return the pending record matching any of the given URLs /
    /// authored paths.
    pub fn take_pending(&mut self, candidates: &[String]) -> Option<PendingBreakpoint> {
        for candidate in candidates {
            let key = ScriptRegistry::normalize_url(candidate);
            if let Some(pending) = self.pending_by_path.shift_remove(&key) {
                return Some(pending);
            }
        }
        None
    }

    /// Increment hit counters for a paused event's `hitBreakpoints`.
    ///
    /// Returns `true` when every attached hit condition votes against pausing
    /// and the stop was not user induced, in which case the caller resumes the
    /// debuggee and suppresses the stopped event.
    pub fn filter_hit_breakpoints(&mut self, hit_breakpoints: &[String], user_induced: bool) -> bool {
        let mut any_condition = false;
        let mut any_pause = false;

        for id in hit_breakpoints {
            if let Some(hc) = self.hit_conditions.get_mut(id) {
                any_condition = true;
                hc.num_hits += 1;
                if hc.condition.should_pause(hc.num_hits) {
                    any_pause = true;
                }
            }
        }

        any_condition && !any_pause && !user_induced
    }

    /// Client ids for a list of CDP breakpoint ids (stopped event payload).
    pub fn client_ids(&self, cdp_ids: &[String]) -> Vec<i64> {
        cdp_ids.iter().filter_map(|id| self.ids.lookup(id)).collect()
    }

    /// Handle CDP `breakpointResolved`: remember the committed id and build
    /// the client-facing breakpoint record for the `breakpoint` event.
    pub fn on_breakpoint_resolved(
        &mut self,
        cx: &TargetCx<'_>,
        ev: &BreakpointResolvedEvent,
    ) -> Option<Breakpoint> {
        let Some(script) = cx.scripts.get_by_id(&ev.location.script_id) else {
            log::debug!(
                target: "adapter",
                "breakpointResolved in unknown script {}", ev.location.script_id
            );
            return None;
        };
        let url = script.url.clone();

        let committed = self.committed_by_url.entry(url).or_default();
        if !committed.contains(&ev.breakpoint_id) {
            committed.push(ev.breakpoint_id.clone());
        }

        let Some(id) = self.ids.lookup(&ev.breakpoint_id) else {
            log::debug!(
                target: "adapter",
                "breakpointResolved for unknown breakpoint {}", ev.breakpoint_id
            );
            return None;
        };
        let (line, column) = client_location(cx, &ev.location);

        Some(Breakpoint {
            id: Some(id),
            verified: true,
            message: None,
            line: Some(line),
            column: Some(column),
        })
    }

    /// Forget all committed breakpoints and hit counters (context reset).
    pub fn reset_committed(&mut self) {
        self.committed_by_url.clear();
        self.hit_conditions.clear();
    }

    fn mint_ids(&mut self, path: &str, request_seq: i64, count: usize) -> Vec<i64> {
        (0..count)
            .map(|i| self.ids.create(format!("unbound:{path}:{request_seq}:{i}")))
            .collect()
    }

    fn unverified_response(
        &mut self,
        args: &SetBreakpointsArguments,
        request_seq: i64,
        existing_ids: Option<Vec<i64>>,
        message: &str,
    ) -> SetBreakpointsResponseBody {
        let ids = existing_ids.unwrap_or_else(|| {
            let path = args.source.path.as_deref().unwrap_or("<unknown>");
            self.mint_ids(path, request_seq, args.breakpoints.len())
        });

        if args.source.path.is_some() {
            self.add_pending(args, request_seq, ids.clone());
        }

        SetBreakpointsResponseBody {
            breakpoints: args
                .breakpoints
                .iter()
                .zip(ids)
                .map(|(bp, id)| Breakpoint {
                    id: Some(id),
                    verified: false,
                    message: Some(message.to_string()),
                    line: Some(bp.line),
                    column: bp.column,
                })
                .collect(),
        }
    }

    /// Clear every committed breakpoint of `url`, then add the requested ones.
    fn replace_breakpoints(
        &mut self,
        cx: &mut TargetCx<'_>,
        url: &str,
        breakpoints: &[SourceBreakpoint],
        locations: &[(u64, u64)],
        ids: &[i64],
    ) -> Result<SetBreakpointsResponseBody, Error> {
        let deadline = Instant::now() + SET_BREAKPOINTS_TIMEOUT;

        // Removal must stay one-at-a-time: batched removal leaves the debuggee
        // rejecting subsequent adds on the same line with "breakpoint already
        // exists".
        let committed = self.committed_by_url.shift_remove(url).unwrap_or_default();
        for breakpoint_id in committed {
            check_deadline(deadline)?;
            self.hit_conditions.remove(&breakpoint_id);
            if let Err(e) = cx.client.remove_breakpoint(&breakpoint_id) {
                log::warn!(target: "adapter", "removeBreakpoint {breakpoint_id}: {e}");
            }
        }

        let mut committed = Vec::new();
        let mut response = Vec::with_capacity(breakpoints.len());

        for ((bp, &(line, column)), &id) in breakpoints.iter().zip(locations).zip(ids) {
            check_deadline(deadline)?;

            // an unparsable hit condition fails this entry before it reaches the target
            let hit_condition = match bp.hit_condition.as_deref().map(str::trim) {
                Some(expr) if !expr.is_empty() => match HitCondition::parse(expr) {
                    Ok(condition) => Some(condition),
                    Err(e) => {
                        response.push(Breakpoint {
                            id: Some(id),
                            verified: false,
                            message: Some(e.to_string()),
                            line: Some(bp.line),
                            column: bp.column,
                        });
                        continue;
                    }
                },
                _ => None,
            };

            match self.add_one(cx, url, line, column, bp.condition.as_deref()) {
                Ok(added) => {
                    self.ids.assign(id, added.breakpoint_id.clone());
                    if let Some(condition) = hit_condition {
                        self.hit_conditions.insert(
                            added.breakpoint_id.clone(),
                            HitConditionBreakpoint {
                                num_hits: 0,
                                condition,
                            },
                        );
                    }
                    committed.push(added.breakpoint_id);

                    let (line, column) = added
                        .actual_location
                        .as_ref()
                        .map(|loc| client_location(cx, loc))
                        .unwrap_or((bp.line, bp.column.unwrap_or(cx.lines.to_client_column(0))));

                    response.push(Breakpoint {
                        id: Some(id),
                        verified: true,
                        message: None,
                        line: Some(line),
                        column: Some(column),
                    });
                }
                Err(e) => {
                    log::warn!(target: "adapter", "add breakpoint at {url}:{line}: {e}");
                    response.push(Breakpoint {
                        id: Some(id),
                        verified: false,
                        message: Some(e.to_string()),
                        line: Some(bp.line),
                        column: bp.column,
                    });
                }
            }
        }

        self.committed_by_url.insert(url.to_string(), committed);

        Ok(SetBreakpointsResponseBody {
            breakpoints: response,
        })
    }

    /// Add one breakpoint, normalizing the two CDP response shapes.
    fn add_one(
        &mut self,
        cx: &mut TargetCx<'_>,
        url: &str,
        line: u64,
        column: u64,
        condition: Option<&str>,
    ) -> Result<AddResult, Error> {
        if ScriptRegistry::is_placeholder_url(url) {
            let script = cx
                .scripts
                .get_by_url(url)
                .ok_or_else(|| Error::BreakpointIgnoredNoTargetPath(url.to_string()))?;
            let result = cx
                .client
                .set_breakpoint(&script.script_id, line, column, condition)?;
            Ok(AddResult {
                breakpoint_id: result.breakpoint_id,
                actual_location: result.actual_location,
            })
        } else {
            // by-URL with a regex so the breakpoint rebinds after a reload
            let result = cx
                .client
                .set_breakpoint_by_url(&url_to_regex(url), line, column, condition)?;
            Ok(AddResult {
                breakpoint_id: result.breakpoint_id,
                actual_location: result.locations.first().cloned(),
            })
        }
    }
}

fn check_deadline(deadline: Instant) -> Result<(), Error> {
    if Instant::now() >= deadline {
        return Err(Error::BreakpointsTimeout(
            SET_BREAKPOINTS_TIMEOUT.as_millis() as u64,
        ));
    }
    Ok(())
}

/// Translate a CDP location back to client coordinates through the source map.
fn client_location(cx: &TargetCx<'_>, location: &Location) -> (u64, u64) {
    let column = location.column_number.unwrap_or(0);
    let (line, column) = match cx.scripts.get_by_id(&location.script_id) {
        Some(script) => match cx
            .sourcemaps
            .generated_to_authored(&script.url, location.line_number, column)
        {
            Some(authored) => (authored.line, authored.column),
            None => (location.line_number, column),
        },
        None => (location.line_number, column),
    };
    (cx.lines.to_client_line(line), cx.lines.to_client_column(column))
}

/// Escape a URL into the regex `Debugger.setBreakpointByUrl` expects. Drive
/// letters match case-insensitively, both slash styles are accepted.
pub fn url_to_regex(url: &str) -> String {
    let mut out = String::with_capacity(url.len() * 2);

    let bytes = url.as_bytes();
    for (i, ch) in url.char_indices() {
        if i == 0 && ch.is_ascii_alphabetic() && bytes.get(1) == Some(&b':') {
            out.push('[');
            out.push(ch.to_ascii_lowercase());
            out.push(ch.to_ascii_uppercase());
            out.push(']');
            continue;
        }
        match ch {
            '/' | '\\' => out.push_str(r"[\/\\]"),
            _ => out.push_str(&regex::escape(&ch.to_string())),
        }
    }

    out
}
