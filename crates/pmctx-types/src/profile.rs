use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileState {
    /// Everything included except the listed instances
    #[default]
    Include,
    /// Everything excluded except the listed instances
    Exclude,
}

/// Per instance-domain entry of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InDomProfile {
    pub indom: u32,
    pub state: ProfileState,
    /// Exceptions to `state`, kept sorted
    pub instances: Vec<i32>,
}

/// Include/exclude lists, one per instance domain, over a global default.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstanceProfile {
    pub state: ProfileState,
    pub domains: Vec<InDomProfile>,
}

impl InstanceProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn domain(&self, indom: u32) -> Option<&InDomProfile> {
        self.domains.iter().find(|d| d.indom == indom)
    }

    /// Add instances to the profile.
    ///
    /// `indom == None` with no instances resets to "include everything".
    /// An empty instance list for a domain includes the whole domain.
    pub fn add(&mut self, indom: Option<u32>, instances: &[i32]) {
        let Some(indom) = indom else {
            if instances.is_empty() {
                self.state = ProfileState::Include;
                self.domains.clear();
            }
            return;
        };
        let entry = self.entry(indom);
        if instances.is_empty() {
            entry.state = ProfileState::Include;
            entry.instances.clear();
            return;
        }
        match entry.state {
            ProfileState::Include => entry.instances.retain(|i| !instances.contains(i)),
            ProfileState::Exclude => merge_sorted(&mut entry.instances, instances),
        }
    }

    /// Remove instances from the profile.
    ///
    /// `indom == None` with no instances resets to "exclude everything".
    /// An empty instance list for a domain excludes the whole domain.
    pub fn delete(&mut self, indom: Option<u32>, instances: &[i32]) {
        let Some(indom) = indom else {
            if instances.is_empty() {
                self.state = ProfileState::Exclude;
                self.domains.clear();
            }
            return;
        };
        let entry = self.entry(indom);
        if instances.is_empty() {
            entry.state = ProfileState::Exclude;
            entry.instances.clear();
            return;
        }
        match entry.state {
            ProfileState::Include => merge_sorted(&mut entry.instances, instances),
            ProfileState::Exclude => entry.instances.retain(|i| !instances.contains(i)),
        }
    }

    pub fn is_included(&self, indom: u32, instance: i32) -> bool {
        match self.domain(indom) {
            Some(d) => {
                let listed = d.instances.binary_search(&instance).is_ok();
                match d.state {
                    ProfileState::Include => !listed,
                    ProfileState::Exclude => listed,
                }
            }
            None => self.state == ProfileState::Include,
        }
    }

    pub fn clear(&mut self) {
        self.state = ProfileState::Include;
        self.domains.clear();
    }

    fn entry(&mut self, indom: u32) -> &mut InDomProfile {
        let pos = match self.domains.iter().position(|d| d.indom == indom) {
            Some(pos) => pos,
            None => {
                self.domains.push(InDomProfile {
                    indom,
                    state: self.state,
                    instances: Vec::new(),
                });
                self.domains.len() - 1
            }
        };
        &mut self.domains[pos]
    }
}

fn merge_sorted(list: &mut Vec<i32>, extra: &[i32]) {
    list.extend_from_slice(extra);
    list.sort_unstable();
    list.dedup();
}
