use std::collections::HashMap;

use http::Method;
use indexmap::IndexMap;
use regex::Regex;
use switchyard_core::VersionSelector;

/// The service method a route dispatches to for one HTTP method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBinding {
    pub service: String,
    pub method: String,
    pub version: Option<VersionSelector>,
}

/// A path template such as `/users/$id/posts/$post` and its bindings per
/// HTTP method.
///
/// Each `$name` placeholder matches one path segment. Leading and trailing
/// slashes are optional when matching.
#[derive(Debug, Clone)]
pub struct Route {
    template: String,
    pattern: Regex,
    placeholders: Vec<String>,
    bindings: HashMap<Method, MethodBinding>,
}

impl Route {
    /// Compiles `template`.
    ///
    /// # Errors
    ///
    /// Returns the regex error if the compiled pattern is rejected.
    pub fn new(template: &str) -> Result<Self, regex::Error> {
        let placeholder = Regex::new(r"\$[A-Za-z0-9_]*")?;
        let trimmed = template.trim_matches('/');
        let mut pattern = String::from("^/?");
        let mut placeholders = Vec::new();
        let mut last = 0;
        for found in placeholder.find_iter(trimmed) {
            pattern.push_str(&regex::escape(&trimmed[last..found.start()]));
            pattern.push_str("([^/]*)");
            placeholders.push(found.as_str()[1..].to_string());
            last = found.end();
        }
        pattern.push_str(&regex::escape(&trimmed[last..]));
        pattern.push_str("/?$");
        Ok(Self {
            template: template.to_string(),
            pattern: Regex::new(&pattern)?,
            placeholders,
            bindings: HashMap::new(),
        })
    }

    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    #[must_use]
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Captured placeholder values when `path` matches, in template order.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<IndexMap<String, String>> {
        let captures = self.pattern.captures(path)?;
        Some(
            self.placeholders
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let value = captures.get(i + 1).map_or("", |m| m.as_str());
                    (name.clone(), value.to_string())
                })
                .collect(),
        )
    }

    /// Binds `http_method` to `service:method`, resolving the highest version
    /// the request may use.
    pub fn bind(
        &mut self,
        http_method: Method,
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> &mut Self {
        self.bind_binding(
            http_method,
            MethodBinding {
                service: service.into(),
                method: method.into(),
                version: None,
            },
        )
    }

    /// Binds `http_method` to a specific version of `service:method`.
    pub fn bind_version(
        &mut self,
        http_method: Method,
        service: impl Into<String>,
        method: impl Into<String>,
        version: VersionSelector,
    ) -> &mut Self {
        self.bind_binding(
            http_method,
            MethodBinding {
                service: service.into(),
                method: method.into(),
                version: Some(version),
            },
        )
    }

    pub(crate) fn bind_binding(&mut self, http_method: Method, binding: MethodBinding) -> &mut Self {
        self.bindings.insert(http_method, binding);
        self
    }

    #[must_use]
    pub fn binding(&self, http_method: &Method) -> Option<&MethodBinding> {
        self.bindings.get(http_method)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&Method, &MethodBinding)> {
        self.bindings.iter()
    }
}
