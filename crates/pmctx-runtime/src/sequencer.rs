//! Opening an archive target: a single archive, a comma-separated list, or
//! a directory of archives, ordered into one chain by start time.

use crate::controller::{ArchiveController, MultiArchiveEntry};
use crate::error::{Error, Result};
use crate::logcontrol::LogCache;
use pmctx_archive::expand_archive_list;
use pmctx_types::ContextFlags;
use tracing::{debug, trace};

/// Open every archive named by `target` and return a controller positioned
/// at the start of the earliest one.
///
/// Two archives with the same start time and the same name are one archive
/// listed twice; the second is dropped. The same start time under different
/// names is an error and nothing stays open.
pub(crate) fn open_chain(
    cache: &LogCache,
    target: &str,
    flags: ContextFlags,
) -> Result<ArchiveController> {
    let expanded = expand_archive_list(target)?;
    if expanded.names.is_empty() {
        return Err(Error::BadSpecification(format!(
            "no archives found in {:?}",
            target
        )));
    }
    let multi = expanded.is_multi_archive(target);

    let mut ctrl = ArchiveController::new(flags, multi);
    match sequence(cache, &mut ctrl, &expanded.names) {
        Ok(()) => Ok(ctrl),
        Err(err) => {
            ctrl.release(cache);
            Err(err)
        }
    }
}

fn sequence(cache: &LogCache, ctrl: &mut ArchiveController, names: &[String]) -> Result<()> {
    let multi = ctrl.is_multi_archive();
    let flags = ctrl.flags();

    for name in names {
        cache.find_or_open(ctrl.log_slot(), name, multi, flags)?;
        let Some(log) = ctrl.log().cloned() else {
            continue;
        };
        let entry = MultiArchiveEntry::from_label(log.name(), log.label());

        let pos = ctrl
            .entries()
            .binary_search_by(|e| e.start.cmp(&entry.start));
        match pos {
            Ok(i) if ctrl.entries()[i].name == entry.name => {
                trace!(archive = %entry.name, "archive listed twice, ignoring");
            }
            Ok(i) => {
                return Err(Error::OverlappingArchives {
                    existing: ctrl.entries()[i].name.clone(),
                    conflicting: entry.name,
                    start: entry.start,
                });
            }
            Err(i) => {
                let meta = log.metadata()?;
                ctrl.namespace_mut().add_archive(&entry.name, &meta);
                ctrl.entries_mut().insert(i, entry);
            }
        }
    }

    if ctrl.entries().len() > 1 {
        ctrl.change_archive(cache, 0)?;
    } else {
        ctrl.position_at_start()?;
    }
    ctrl.namespace_mut().rebuild(true);

    debug!(
        archives = ctrl.entries().len(),
        multi,
        origin = %ctrl.origin(),
        "opened archive chain"
    );
    Ok(())
}
