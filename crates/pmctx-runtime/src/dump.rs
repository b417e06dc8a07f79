use crate::context::{Context, Payload};
use crate::current;
use crate::registry::{ContextCell, Registry, Slot, SlotState};
use pmctx_types::{ContextHandle, HostSpec, ProfileState};
use std::fmt::{self, Write};
use std::time::{Duration, Instant};

const LOCK_WAIT: Duration = Duration::from_millis(100);

impl Registry {
    /// Human-readable listing of the registry, or of the one context
    /// `target`.
    pub fn dump_contexts(&self, target: Option<ContextHandle>) -> String {
        self.dump_contexts_indom(target, None)
    }

    /// Like [`Registry::dump_contexts`], with instance profiles limited to
    /// the domain `indom`.
    pub fn dump_contexts_indom(
        &self,
        target: Option<ContextHandle>,
        indom: Option<u32>,
    ) -> String {
        let mut out = String::new();
        // writing to a String cannot fail
        let _ = self.dump_to(&mut out, target, indom);
        out
    }

    /// Write the listing to `out`.
    ///
    /// The slot table is copied and released first; each context is then
    /// locked on its own, and one that stays busy is reported as such.
    /// `indom` restricts the profile listing to one instance domain.
    pub fn dump_to(
        &self,
        out: &mut impl Write,
        target: Option<ContextHandle>,
        indom: Option<u32>,
    ) -> fmt::Result {
        let snapshot: Vec<(usize, SlotState, Option<ContextCell>)> = {
            let table = self.lock_slots();
            table
                .slots
                .iter()
                .enumerate()
                .map(|(i, slot)| {
                    let cell = match slot {
                        Slot::Ready { context, .. } => Some(ContextCell::clone(context)),
                        _ => None,
                    };
                    (i, SlotState::from(slot), cell)
                })
                .collect()
        };

        match current::get(self.id()) {
            Some(cur) => writeln!(out, "Dump Contexts: current context = {}", cur.handle)?,
            None => writeln!(out, "Dump Contexts: current context = none")?,
        }

        let mut found = false;
        for (slot, state, cell) in snapshot {
            match (state, target) {
                (SlotState::Ready(handle), Some(want)) if handle != want => continue,
                (SlotState::Ready(_), _) => {}
                (_, Some(_)) => continue,
                _ => {}
            }
            found = true;
            match (state, cell) {
                (SlotState::Free, _) => writeln!(out, "Context[{}] free", slot)?,
                (SlotState::Initializing, _) => writeln!(out, "Context[{}] initializing", slot)?,
                (SlotState::TearingDown(handle), _) => {
                    writeln!(out, "Context[{}] handle {}: tearing down", slot, handle)?
                }
                (SlotState::Ready(handle), Some(cell)) => match cell.try_lock_for(LOCK_WAIT) {
                    Some(ctx) => write_context(out, &ctx, indom)?,
                    None => writeln!(out, "Context[{}] handle {}: busy", slot, handle)?,
                },
                (SlotState::Ready(handle), None) => {
                    writeln!(out, "Context[{}] handle {}: gone", slot, handle)?
                }
            }
        }

        if !found && let Some(want) = target {
            writeln!(out, "Context {}: no such context", want)?;
        }
        Ok(())
    }
}

fn write_context(out: &mut impl Write, ctx: &Context, indom: Option<u32>) -> fmt::Result {
    write!(out, "Context[{}] handle {}: {}", ctx.slot, ctx.handle, ctx.kind)?;
    match &ctx.payload {
        Payload::Live(live) => {
            write!(out, " {}", HostSpec::unparse_list(live.hosts()))?;
            match live.peer() {
                Some(peer) => write!(out, " pmcd=connected({})", peer)?,
                None => write!(out, " pmcd=disconnected")?,
            }
            let link = live.link();
            if link.is_exclusive() {
                write!(out, " exclusive")?;
            } else {
                write!(out, " refcnt={}", link.refcount())?;
            }
            writeln!(out, " timeout={}s", live.request_timeout().as_secs())?;
            let backoff = live.backoff();
            if backoff.attempts() > 0 {
                let wait = backoff
                    .retry_after()
                    .map(|at| at.saturating_duration_since(Instant::now()).as_secs())
                    .unwrap_or(0);
                writeln!(
                    out,
                    "    reconnect: {} failed attempt(s), next in {}s",
                    backoff.attempts(),
                    wait
                )?;
            }
        }
        Payload::Archive(ctrl) => {
            match ctrl.log() {
                Some(log) => write!(out, " {} refcnt={}", log.name(), log.refcount())?,
                None => write!(out, " <no log>")?,
            }
            match ctrl.volume() {
                Some(vol) => write!(out, " vol={}", vol)?,
                None => write!(out, " vol=-")?,
            }
            writeln!(out, " offset={}", ctrl.offset())?;
            if ctrl.is_multi_archive() {
                for (i, entry) in ctrl.entries().iter().enumerate() {
                    let marker = if i == ctrl.current_archive() { '*' } else { ' ' };
                    writeln!(
                        out,
                        "   {}[{}] {} start={} host={}",
                        marker, i, entry.name, entry.start, entry.hostname
                    )?;
                }
            }
        }
        Payload::Local { hostname } => writeln!(out, " {}", hostname)?,
        Payload::Empty => writeln!(out)?,
    }

    let flags = ctx.flags.names();
    if !flags.is_empty() {
        writeln!(out, "    flags: {}", flags.join(","))?;
    }
    writeln!(
        out,
        "    window: mode={} origin={} delta={}ms",
        ctx.window.mode.as_str(),
        ctx.window.origin,
        ctx.window.delta_ms
    )?;
    write_profile(out, ctx, indom)
}

fn write_profile(out: &mut impl Write, ctx: &Context, indom: Option<u32>) -> fmt::Result {
    writeln!(
        out,
        "    profile: {} by default, {} domain(s), {}",
        state_name(ctx.profile.state),
        ctx.profile.domains.len(),
        if ctx.profile_sent() { "sent" } else { "not sent" }
    )?;
    for domain in &ctx.profile.domains {
        if indom.is_some_and(|want| want != domain.indom) {
            continue;
        }
        let listed = if domain.instances.is_empty() {
            "-".to_string()
        } else {
            domain
                .instances
                .iter()
                .map(i32::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        };
        let except = match domain.state {
            ProfileState::Include => "exclude",
            ProfileState::Exclude => "include",
        };
        writeln!(
            out,
            "      indom {}: {} all, {} [{}]",
            domain.indom,
            state_name(domain.state),
            except,
            listed
        )?;
    }
    Ok(())
}

fn state_name(state: ProfileState) -> &'static str {
    match state {
        ProfileState::Include => "include",
        ProfileState::Exclude => "exclude",
    }
}
