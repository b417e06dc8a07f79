use pmctx_archive::{ArchiveMetadata, LabelSet, MetricDesc};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, trace, warn};

/// Metric names, descriptors and label sets merged across every archive of
/// a chain.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    descs: BTreeMap<u32, MetricDesc>,
    names: HashMap<String, u32>,
    labelsets: Vec<LabelSet>,
    duplicate_labelsets: Vec<LabelSet>,
    name_conflicts: Vec<String>,
    built: bool,
}

impl Namespace {
    /// Fold one archive's metadata in. The name index goes stale until the
    /// next [`Namespace::rebuild`].
    pub fn add_archive(&mut self, archive: &str, meta: &ArchiveMetadata) {
        for desc in &meta.descs {
            let merged = self
                .descs
                .entry(desc.pmid)
                .or_insert_with(|| MetricDesc {
                    names: Vec::new(),
                    ..desc.clone()
                });
            for name in &desc.names {
                if !merged.names.contains(name) {
                    merged.names.push(name.clone());
                }
            }
        }
        for set in &meta.labelsets {
            if self.labelsets.contains(set) {
                self.duplicate_labelsets.push(set.clone());
            } else {
                self.labelsets.push(set.clone());
            }
        }
        self.built = false;
        trace!(archive, descs = meta.descs.len(), "merged archive metadata");
    }

    /// Rebuild the name index. Without `rebuild_now` an index that is
    /// already current is left alone.
    pub fn rebuild(&mut self, rebuild_now: bool) {
        if self.built && !rebuild_now {
            return;
        }
        self.names.clear();
        self.name_conflicts.clear();
        for desc in self.descs.values() {
            for name in &desc.names {
                match self.names.get(name) {
                    Some(pmid) if *pmid != desc.pmid => self.name_conflicts.push(name.clone()),
                    Some(_) => {}
                    None => {
                        self.names.insert(name.clone(), desc.pmid);
                    }
                }
            }
        }
        self.built = true;

        if !self.duplicate_labelsets.is_empty() {
            info!(
                count = self.duplicate_labelsets.len(),
                "duplicate label sets across archives"
            );
        }
        for name in &self.name_conflicts {
            warn!(metric = %name, "metric name maps to different ids across archives");
        }
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.names.get(name).copied()
    }

    pub fn desc(&self, pmid: u32) -> Option<&MetricDesc> {
        self.descs.get(&pmid)
    }

    pub fn len(&self) -> usize {
        self.descs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descs.is_empty()
    }

    pub fn labelsets(&self) -> &[LabelSet] {
        &self.labelsets
    }

    /// Label sets seen more than once across the chain
    pub fn duplicate_labelsets(&self) -> &[LabelSet] {
        &self.duplicate_labelsets
    }

    pub fn name_conflicts(&self) -> &[String] {
        &self.name_conflicts
    }

    pub fn is_built(&self) -> bool {
        self.built
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(descs: Vec<MetricDesc>, labelsets: Vec<LabelSet>) -> ArchiveMetadata {
        ArchiveMetadata { descs, labelsets }
    }

    #[test]
    fn test_merge_and_lookup() {
        let mut ns = Namespace::default();
        ns.add_archive("a", &meta(vec![MetricDesc::new(1, "kernel.all.load")], vec![]));
        ns.add_archive(
            "b",
            &meta(
                vec![
                    MetricDesc::new(1, "kernel.all.load"),
                    MetricDesc::new(2, "mem.util.free"),
                ],
                vec![],
            ),
        );
        assert!(!ns.is_built());
        ns.rebuild(true);

        assert_eq!(ns.len(), 2);
        assert_eq!(ns.lookup("mem.util.free"), Some(2));
        assert_eq!(ns.desc(1).map(|d| d.names.len()), Some(1));
        assert!(ns.name_conflicts().is_empty());
    }

    #[test]
    fn test_duplicate_labelsets_are_kept_once() {
        let set = LabelSet::new(1, 0, r#"{"hostname":"db01"}"#);
        let mut ns = Namespace::default();
        ns.add_archive("a", &meta(vec![], vec![set.clone()]));
        ns.add_archive("b", &meta(vec![], vec![set.clone()]));
        ns.rebuild(true);

        assert_eq!(ns.labelsets(), &[set.clone()]);
        assert_eq!(ns.duplicate_labelsets(), &[set]);
    }

    #[test]
    fn test_name_conflict_keeps_first_id() {
        let mut ns = Namespace::default();
        ns.add_archive("a", &meta(vec![MetricDesc::new(1, "disk.total")], vec![]));
        ns.add_archive("b", &meta(vec![MetricDesc::new(9, "disk.total")], vec![]));
        ns.rebuild(true);

        assert_eq!(ns.lookup("disk.total"), Some(1));
        assert_eq!(ns.name_conflicts(), &["disk.total".to_string()]);
    }

    #[test]
    fn test_rebuild_skipped_when_current() {
        let mut ns = Namespace::default();
        ns.add_archive("a", &meta(vec![MetricDesc::new(1, "x")], vec![]));
        ns.rebuild(false);
        assert_eq!(ns.lookup("x"), Some(1));
        ns.rebuild(false);
        assert!(ns.is_built());
    }
}
