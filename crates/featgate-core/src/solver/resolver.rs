use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use super::{ResourceSet, Resolver};
use crate::error::ResolverError;
use crate::resource::{Requirement, Resource};

const DEPLOYMENT: &str = "deployment request";

/// Worklist resolver over capabilities
///
/// Every requirement is satisfied by the root, else by an already selected
/// resource, else by the highest version candidate, which is then selected in
/// turn. There is no backtracking: the first choice for a requirement is final.
#[derive(Debug, Clone, Default)]
pub struct CapabilityResolver;

impl CapabilityResolver {
    pub fn new() -> Self {
        Self
    }
}

struct Selection<'a> {
    resources: Vec<Arc<Resource>>,
    ids: HashSet<&'a str>,
    queue: VecDeque<(String, Requirement)>,
}

impl<'a> Selection<'a> {
    fn select(&mut self, resource: &'a Arc<Resource>) -> Result<(), ResolverError> {
        if !self.ids.insert(resource.id.as_str()) {
            return Ok(());
        }
        if let Some(other) = self.singleton_conflict(resource) {
            return Err(ResolverError::SingletonConflict {
                name: resource.symbolic_name.clone(),
                first: other.id.clone(),
                second: resource.id.clone(),
            });
        }

        log::trace!("Selected {}", resource);
        for requirement in &resource.requirements {
            self.queue.push_back((resource.id.clone(), requirement.clone()));
        }
        self.resources.push(Arc::clone(resource));
        Ok(())
    }

    fn singleton_conflict(&self, resource: &Resource) -> Option<&Arc<Resource>> {
        if !resource.singleton {
            return None;
        }
        self.resources
            .iter()
            .find(|r| r.singleton && r.symbolic_name == resource.symbolic_name && r.id != resource.id)
    }

    fn provides(&self, requirement: &Requirement) -> bool {
        self.resources.iter().any(|r| r.provides(requirement))
    }
}

impl Resolver for CapabilityResolver {
    fn resolve(
        &self,
        root: &Resource,
        resources: &ResourceSet,
        allow_optional_imports: bool,
    ) -> Result<Vec<Arc<Resource>>, ResolverError> {
        let mut selection = Selection {
            resources: Vec::new(),
            ids: HashSet::new(),
            queue: VecDeque::new(),
        };

        for resource in &resources.mandatory {
            selection.select(resource)?;
        }
        for requirement in &resources.requirements {
            selection
                .queue
                .push_back((DEPLOYMENT.to_string(), requirement.clone()));
        }

        while let Some((requirer, requirement)) = selection.queue.pop_front() {
            if requirement.optional && !allow_optional_imports {
                continue;
            }
            if root.provides(&requirement) || selection.provides(&requirement) {
                continue;
            }

            let candidate = resources
                .mandatory
                .iter()
                .chain(resources.optional.iter())
                .filter(|r| !selection.ids.contains(r.id.as_str()))
                .filter(|r| r.provides(&requirement))
                .filter(|r| selection.singleton_conflict(r).is_none())
                .fold(None::<&Arc<Resource>>, |best, r| match best {
                    Some(b) if b.version >= r.version => Some(b),
                    _ => Some(r),
                });

            match candidate {
                Some(resource) => selection.select(resource)?,
                None if requirement.optional => {
                    log::debug!("Optional requirement {} of {} left unwired", requirement, requirer);
                }
                None => {
                    return Err(ResolverError::MissingRequirement {
                        resource: requirer,
                        requirement: requirement.to_string(),
                    })
                }
            }
        }

        Ok(selection.resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Manifest, ResourceBuilder};
    use indexmap::IndexMap;

    fn bundle(id: &str, headers: &[(&str, &str)]) -> Resource {
        let headers: IndexMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ResourceBuilder::build(id, &Manifest::from_headers(headers)).unwrap()
    }

    fn system(exports: &str) -> Resource {
        bundle(
            "system-bundle",
            &[("Bundle-SymbolicName", "system-bundle"), ("Export-Package", exports)],
        )
    }

    #[test]
    fn test_import_satisfied_by_root() {
        let root = system("org.osgi.framework;version=1.9");
        let resources = ResourceSet::new().with_mandatory(bundle(
            "core",
            &[
                ("Bundle-SymbolicName", "core"),
                ("Import-Package", "org.osgi.framework;version=\"[1.8,2)\""),
            ],
        ));
        let resolved = CapabilityResolver::new().resolve(&root, &resources, false).unwrap();
        assert_eq!(resolved.len(), 1);
    }

    #[test]
    fn test_missing_import_fails() {
        let root = system("org.osgi.framework");
        let resources = ResourceSet::new().with_mandatory(bundle(
            "core",
            &[("Bundle-SymbolicName", "core"), ("Import-Package", "org.missing")],
        ));
        let err = CapabilityResolver::new().resolve(&root, &resources, false).unwrap_err();
        match err {
            ResolverError::MissingRequirement { resource, requirement } => {
                assert_eq!(resource, "core");
                assert!(requirement.contains("org.missing"));
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn test_optional_candidate_pulled_in_by_highest_version() {
        let root = system("org.osgi.framework");
        let resources = ResourceSet::new()
            .with_mandatory(bundle(
                "core",
                &[("Bundle-SymbolicName", "core"), ("Import-Package", "org.util")],
            ))
            .with_optional(bundle(
                "util-1",
                &[
                    ("Bundle-SymbolicName", "util"),
                    ("Bundle-Version", "1.0"),
                    ("Export-Package", "org.util"),
                ],
            ))
            .with_optional(bundle(
                "util-2",
                &[
                    ("Bundle-SymbolicName", "util"),
                    ("Bundle-Version", "2.0"),
                    ("Export-Package", "org.util"),
                ],
            ))
            .with_optional(bundle("unused", &[("Bundle-SymbolicName", "unused")]));

        let resolved = CapabilityResolver::new().resolve(&root, &resources, false).unwrap();
        let ids: Vec<&str> = resolved.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["core", "util-2"]);
    }

    #[test]
    fn test_optional_imports() {
        let root = system("org.osgi.framework");
        let core = bundle(
            "core",
            &[
                ("Bundle-SymbolicName", "core"),
                ("Import-Package", "org.maybe;resolution:=optional, org.absent;resolution:=optional"),
            ],
        );
        let provider = bundle(
            "maybe",
            &[("Bundle-SymbolicName", "maybe"), ("Export-Package", "org.maybe")],
        );
        let resources = ResourceSet::new().with_mandatory(core).with_optional(provider);

        let without = CapabilityResolver::new().resolve(&root, &resources, false).unwrap();
        assert_eq!(without.len(), 1);

        let with = CapabilityResolver::new().resolve(&root, &resources, true).unwrap();
        assert_eq!(with.len(), 2);
    }

    #[test]
    fn test_singleton_conflict() {
        let root = system("org.osgi.framework");
        let resources = ResourceSet::new()
            .with_mandatory(bundle(
                "a-1",
                &[("Bundle-SymbolicName", "a;singleton:=true"), ("Bundle-Version", "1.0")],
            ))
            .with_mandatory(bundle(
                "a-2",
                &[("Bundle-SymbolicName", "a;singleton:=true"), ("Bundle-Version", "2.0")],
            ));
        let err = CapabilityResolver::new().resolve(&root, &resources, false).unwrap_err();
        assert!(matches!(err, ResolverError::SingletonConflict { .. }));
    }

    #[test]
    fn test_deployment_requirements() {
        let root = system("org.osgi.framework");
        let requirement = ResourceBuilder::requirements("osgi.wiring.package;filter:=\"(osgi.wiring.package=org.absent)\"")
            .unwrap()
            .remove(0);
        let resources = ResourceSet::new().with_requirement(requirement);
        let err = CapabilityResolver::new().resolve(&root, &resources, false).unwrap_err();
        assert!(matches!(
            err,
            ResolverError::MissingRequirement { ref resource, .. } if resource == DEPLOYMENT
        ));
    }
}
