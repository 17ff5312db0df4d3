//! Guessing the tag of a release from a package name and version.

/// Produces tag names a project might have used for a release, most likely first.
pub trait TagNamingConvention: Send + Sync {
    fn candidates(&self, name: &str, version: &str) -> Vec<String>;
}

impl<F> TagNamingConvention for F
where
    F: Fn(&str, &str) -> Vec<String> + Send + Sync,
{
    fn candidates(&self, name: &str, version: &str) -> Vec<String> {
        self(name, version)
    }
}

/// A tag name with `{name}`, `{version}` and `{version_}` placeholders, the latter being
/// the version with dots replaced by underscores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagTemplate(String);

impl TagTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        TagTemplate(template.into())
    }
}

impl TagNamingConvention for TagTemplate {
    fn candidates(&self, name: &str, version: &str) -> Vec<String> {
        vec![self
            .0
            .replace("{name}", name)
            .replace("{version_}", &version.replace('.', "_"))
            .replace("{version}", version)]
    }
}

const DEFAULT_TEMPLATES: &[&str] = &[
    "{version}",
    "v{version}",
    "{name}-{version}",
    "{name}_{version}",
    "{name}-v{version}",
    "{name}@{version}",
    "release-{version}",
    "{version_}",
    "{name}-{version_}",
    "{name}_{version_}",
];

/// Picks the first candidate tag, in convention order, that exists in a repository.
///
/// Every candidate is first compared exactly against the available tags. Only if none
/// matches, the candidates are compared again ignoring ASCII case. So if both `1.0.0`
/// and `v1.0.0` exist, `1.0.0` wins because the bare version comes first.
pub struct TagGuesser {
    conventions: Vec<Box<dyn TagNamingConvention>>,
}

impl Default for TagGuesser {
    fn default() -> Self {
        TagGuesser::new(
            DEFAULT_TEMPLATES
                .iter()
                .map(|template| {
                    Box::new(TagTemplate::new(*template)) as Box<dyn TagNamingConvention>
                })
                .collect(),
        )
    }
}

impl TagGuesser {
    pub fn new(conventions: Vec<Box<dyn TagNamingConvention>>) -> Self {
        TagGuesser { conventions }
    }

    /// Adds a convention that is tried after all existing ones.
    pub fn with_convention(mut self, convention: impl TagNamingConvention + 'static) -> Self {
        self.conventions.push(Box::new(convention));
        self
    }

    pub fn candidates(&self, name: &str, version: &str) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        for candidate in self
            .conventions
            .iter()
            .flat_map(|convention| convention.candidates(name, version))
        {
            if !candidate.is_empty() && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
        candidates
    }

    pub fn guess<'a>(&self, name: &str, version: &str, tags: &'a [String]) -> Option<&'a str> {
        if version.is_empty() {
            return None;
        }
        let candidates = self.candidates(name, version);

        candidates
            .iter()
            .find_map(|candidate| tags.iter().find(|tag| *tag == candidate))
            .or_else(|| {
                candidates.iter().find_map(|candidate| {
                    tags.iter().find(|tag| tag.eq_ignore_ascii_case(candidate))
                })
            })
            .map(String::as_str)
    }
}
