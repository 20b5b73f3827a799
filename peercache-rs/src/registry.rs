//! Keeps track of all groups known to a node.
//!
//! The registry is used to resolve requests of other peers, which only name the group they are
//! interested in. It is owned by the [Node](crate::node::Node) and handed around by reference.
use std::sync::{Arc, RwLock};

use fnv::FnvHashMap;

use crate::group::Group;

/// Maps group names to groups.
///
/// # Examples
/// ```
/// # use peercache::group::Group;
/// # use peercache::registry::Groups;
/// let groups = Groups::default();
/// groups.register(Group::builder("scores").build());
///
/// assert_eq!(groups.find("scores").unwrap().name(), "scores");
/// assert!(groups.find("unknown").is_none());
/// ```
#[derive(Default)]
pub struct Groups {
    groups: RwLock<FnvHashMap<String, Arc<Group>>>,
}

impl Groups {
    /// Registers the given group.
    ///
    /// If a group with the same name is already present, it is replaced.
    pub fn register(&self, group: Arc<Group>) {
        let name = group.name().to_owned();
        let previous = self.groups.write().unwrap().insert(name.clone(), group);

        if previous.is_some() {
            log::warn!("Group {} has been re-registered. Replacing the previous one.", name);
        } else {
            log::info!("Registered group {}.", name);
        }
    }

    /// Returns the group with the given name.
    pub fn find(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().unwrap().get(name).cloned()
    }

    /// Returns the names of all groups in alphabetical order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.read().unwrap().keys().cloned().collect();
        names.sort();

        names
    }

    /// Returns the number of known groups.
    pub fn len(&self) -> usize {
        self.groups.read().unwrap().len()
    }

    /// Determines if no group is known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use crate::group::{source_fn, Group};
    use crate::registry::Groups;

    #[test]
    fn groups_are_listed_alphabetically() {
        let groups = Groups::default();
        assert_eq!(groups.is_empty(), true);

        groups.register(Group::builder("users").build());
        groups.register(Group::builder("scores").build());

        assert_eq!(groups.len(), 2);
        assert_eq!(groups.names(), vec!["scores".to_owned(), "users".to_owned()]);
    }

    #[test]
    fn last_registration_wins() {
        crate::testing::test_async(async {
            let groups = Groups::default();
            groups.register(
                Group::builder("scores")
                    .source(source_fn(|_key: String| async { Ok(b"first".to_vec()) }))
                    .build(),
            );
            groups.register(
                Group::builder("scores")
                    .source(source_fn(|_key: String| async { Ok(b"second".to_vec()) }))
                    .build(),
            );

            assert_eq!(groups.len(), 1);
            let group = groups.find("scores").unwrap();
            assert_eq!(group.get("Tom").await.unwrap().to_string(), "second");
        });
    }
}
