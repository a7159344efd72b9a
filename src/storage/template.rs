//! The storage path template language.
//!
//! Templates embed partition key components (`{field.component}`, optionally
//! pinned to a literal with `{field.component[literal]}`), the per-partition
//! `{input_fingerprint}`, and resolution tokens filled in by the enclosing
//! graph: `{graph_name}`, `{names}`, `{name}`, `{path_tags}`, `{extension}`.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::partition::{CompositeKey, CompositeKeyTypes};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Token {
    Literal(String),
    Field {
        name: String,
        component: String,
        pinned: Option<String>,
    },
    InputFingerprint,
    GraphName,
    Names,
    Name,
    PathTags,
    Extension,
}

/// A parsed path template, convertible to concrete paths, discovery
/// wildcards, and a parser for recovering keys from matched paths.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathTemplate {
    tokens: Vec<Token>,
}

impl PathTemplate {
    pub fn parse(spec: &str) -> Result<PathTemplate> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = spec.chars();
        while let Some(c) = chars.next() {
            if c != '{' {
                literal.push(c);
                continue;
            }
            let mut placeholder = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => placeholder.push(c),
                    None => {
                        return Err(Error::Definition(format!(
                            "Unterminated placeholder in path template: '{}'",
                            spec
                        )))
                    }
                }
            }
            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(Self::parse_placeholder(spec, &placeholder)?);
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }
        Ok(PathTemplate { tokens })
    }

    fn parse_placeholder(spec: &str, placeholder: &str) -> Result<Token> {
        match placeholder {
            "input_fingerprint" => return Ok(Token::InputFingerprint),
            "graph_name" => return Ok(Token::GraphName),
            "names" => return Ok(Token::Names),
            "name" => return Ok(Token::Name),
            "path_tags" => return Ok(Token::PathTags),
            "extension" => return Ok(Token::Extension),
            _ => {}
        }
        let (body, pinned) = match placeholder.find('[') {
            Some(open) if placeholder.ends_with(']') => (
                &placeholder[..open],
                Some(placeholder[open + 1..placeholder.len() - 1].to_string()),
            ),
            _ => (placeholder, None),
        };
        let mut parts = body.splitn(2, '.');
        let name = parts.next().unwrap_or("");
        let component = parts.next().unwrap_or("");
        if name.is_empty() || component.is_empty() {
            return Err(Error::Definition(format!(
                "'{}' cannot be used in a partition path; access a key component (eg: '{}.key') in '{}'",
                placeholder, placeholder, spec
            )));
        }
        Ok(Token::Field {
            name: name.to_string(),
            component: component.to_string(),
            pinned,
        })
    }

    /// The template text, reassembled.
    pub fn spec(&self) -> String {
        self.tokens
            .iter()
            .map(|token| match token {
                Token::Literal(text) => text.clone(),
                Token::Field { name, component, pinned } => match pinned {
                    Some(pinned) => format!("{{{}.{}[{}]}}", name, component, pinned),
                    None => format!("{{{}.{}}}", name, component),
                },
                Token::InputFingerprint => "{input_fingerprint}".to_string(),
                Token::GraphName => "{graph_name}".to_string(),
                Token::Names => "{names}".to_string(),
                Token::Name => "{name}".to_string(),
                Token::PathTags => "{path_tags}".to_string(),
                Token::Extension => "{extension}".to_string(),
            })
            .collect()
    }

    pub fn includes_input_fingerprint(&self) -> bool {
        self.tokens.iter().any(|token| *token == Token::InputFingerprint)
    }

    /// The partition field names consumed by this template.
    pub fn field_names(&self) -> std::collections::BTreeSet<&str> {
        self.tokens
            .iter()
            .filter_map(|token| match token {
                Token::Field { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    fn substitute<F>(&self, mut replace: F) -> PathTemplate
    where
        F: FnMut(&Token) -> Option<String>,
    {
        let mut out: Vec<Token> = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            // Merge literal runs so empty substitutions collapse cleanly.
            let text = match replace(token) {
                Some(text) => Some(text),
                None => match token {
                    Token::Literal(text) => Some(text.clone()),
                    _ => None,
                },
            };
            match text {
                Some(text) => match out.last_mut() {
                    Some(Token::Literal(tail)) => tail.push_str(&text),
                    _ => out.push(Token::Literal(text)),
                },
                None => out.push(token.clone()),
            }
        }
        PathTemplate { tokens: normalize(out) }
    }

    pub fn resolve_graph_name(&self, graph_name: &str) -> PathTemplate {
        let graph_name = graph_name.to_string();
        self.substitute(|token| match token {
            Token::GraphName => Some(graph_name.clone()),
            _ => None,
        })
    }

    /// Substitute `{names}` with the `/`-joined name chain and `{name}` with
    /// its final element.
    pub fn resolve_names(&self, names: &[String]) -> PathTemplate {
        let joined = names.join("/");
        let last = names.last().cloned().unwrap_or_default();
        self.substitute(|token| match token {
            Token::Names => Some(joined.clone()),
            Token::Name => Some(last.clone()),
            _ => None,
        })
    }

    /// Substitute `{path_tags}` with sorted `key=value` segments. An empty
    /// mapping collapses, leaving no empty path segment behind.
    pub fn resolve_path_tags(&self, path_tags: &BTreeMap<String, String>) -> PathTemplate {
        let rendered = path_tags
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("/");
        self.substitute(|token| match token {
            Token::PathTags => Some(rendered.clone()),
            _ => None,
        })
    }

    pub fn resolve_extension(&self, extension: &str) -> PathTemplate {
        let extension = extension.to_string();
        self.substitute(|token| match token {
            Token::Extension => Some(extension.clone()),
            _ => None,
        })
    }

    fn err_unresolved(&self, token: &Token) -> Error {
        Error::Validation(format!(
            "Path template '{}' still contains the {:?} token; was the artifact added to a graph?",
            self.spec(),
            token
        ))
    }

    /// Render a concrete path for one partition.
    pub fn format(&self, keys: &CompositeKey, input_fingerprint: Fingerprint) -> Result<String> {
        let mut path = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => path.push_str(text),
                Token::Field { name, component, pinned } => {
                    let key = keys.get(name).ok_or_else(|| {
                        Error::Validation(format!(
                            "No '{}' partition key passed for path template '{}'",
                            name,
                            self.spec()
                        ))
                    })?;
                    let rendered = key.key_component(component)?;
                    if let Some(pinned) = pinned {
                        if rendered != *pinned {
                            return Err(Error::Validation(format!(
                                "'{}.{}' is pinned to '{}' but the key renders as '{}'",
                                name, component, pinned, rendered
                            )));
                        }
                    }
                    path.push_str(&rendered);
                }
                Token::InputFingerprint => match input_fingerprint.key() {
                    Some(key) => path.push_str(&key.to_string()),
                    None => {
                        return Err(Error::Validation(format!(
                            "An empty input fingerprint cannot be rendered into '{}'",
                            self.spec()
                        )))
                    }
                },
                other => return Err(self.err_unresolved(other)),
            }
        }
        Ok(collapse_slashes(&path))
    }

    /// Convert the template to a discovery wildcard: every non-hard-coded
    /// component becomes `*`, pinned components become their literal.
    pub fn to_wildcard(&self, key_types: &CompositeKeyTypes) -> Result<String> {
        let mut pattern = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => pattern.push_str(text),
                Token::Field { name, component, pinned } => {
                    let key_type = key_types.get(name).ok_or_else(|| {
                        Error::Validation(format!(
                            "No '{}' partition key found, expected one of {:?}",
                            name,
                            key_types.keys().collect::<Vec<_>>()
                        ))
                    })?;
                    if !key_type.key_components().contains(&component.as_str()) {
                        return Err(Error::Validation(format!(
                            "{:?} has no key component '{}'",
                            key_type, component
                        )));
                    }
                    match pinned {
                        Some(pinned) => pattern.push_str(pinned),
                        None => pattern.push('*'),
                    }
                }
                Token::InputFingerprint => pattern.push('*'),
                other => return Err(self.err_unresolved(other)),
            }
        }
        Ok(collapse_slashes(&pattern))
    }

    /// Compile a parser recovering `(CompositeKey, input fingerprint)` from
    /// paths produced by (or discovered against) this template.
    pub fn compile_parser(&self, key_types: &CompositeKeyTypes) -> Result<PathParser> {
        let mut pattern = String::from("^");
        let mut groups = Vec::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => pattern.push_str(&regex::escape(&collapse_slashes(text))),
                Token::Field { name, component, pinned } => {
                    match pinned {
                        Some(pinned) => {
                            // Pinned components require equality and
                            // contribute their literal value.
                            pattern.push_str(&regex::escape(pinned));
                            groups.push(Group::Pinned {
                                name: name.clone(),
                                component: component.clone(),
                                value: pinned.clone(),
                            });
                        }
                        None => {
                            pattern.push_str("([^/]+?)");
                            groups.push(Group::Field {
                                name: name.clone(),
                                component: component.clone(),
                            });
                        }
                    }
                }
                Token::InputFingerprint => {
                    pattern.push_str("(-?[0-9]+)");
                    groups.push(Group::InputFingerprint);
                }
                other => return Err(self.err_unresolved(other)),
            }
        }
        pattern.push('$');
        let regex = Regex::new(&pattern)
            .map_err(|e| Error::Definition(format!("Invalid path template regex: {}", e)))?;
        Ok(PathParser {
            spec: self.spec(),
            regex,
            groups,
            key_types: key_types.clone(),
        })
    }
}

fn normalize(tokens: Vec<Token>) -> Vec<Token> {
    // Collapse slash runs introduced by empty substitutions (eg: no path
    // tags) so templates keep producing clean paths.
    tokens
        .into_iter()
        .map(|token| match token {
            Token::Literal(text) => Token::Literal(collapse_slashes(&text)),
            other => other,
        })
        .collect()
}

fn collapse_slashes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_slash = false;
    for c in text.chars() {
        if c == '/' {
            if last_slash {
                continue;
            }
            last_slash = true;
        } else {
            last_slash = false;
        }
        out.push(c);
    }
    out
}

#[derive(Clone, Debug)]
enum Group {
    Field { name: String, component: String },
    Pinned { name: String, component: String, value: String },
    InputFingerprint,
}

/// A compiled matcher for one template and partition scheme.
pub struct PathParser {
    spec: String,
    regex: Regex,
    groups: Vec<Group>,
    key_types: CompositeKeyTypes,
}

impl PathParser {
    /// Parse a path back into its composite key and input fingerprint.
    pub fn parse(&self, path: &str) -> Result<(CompositeKey, Fingerprint)> {
        let captures = self.regex.captures(path).ok_or_else(|| {
            Error::Validation(format!("Unable to parse '{}' with '{}'", path, self.spec))
        })?;
        let mut components: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut input_fingerprint = Fingerprint::empty();
        let mut capture_idx = 1;
        for group in &self.groups {
            match group {
                Group::Field { name, component } => {
                    let value = captures
                        .get(capture_idx)
                        .expect("capture group exists for field")
                        .as_str();
                    capture_idx += 1;
                    components
                        .entry(name.clone())
                        .or_default()
                        .insert(component.clone(), value.to_string());
                }
                Group::Pinned { name, component, value } => {
                    components
                        .entry(name.clone())
                        .or_default()
                        .insert(component.clone(), value.clone());
                }
                Group::InputFingerprint => {
                    let value = captures
                        .get(capture_idx)
                        .expect("capture group exists for fingerprint")
                        .as_str();
                    capture_idx += 1;
                    let key: i64 = value.parse().map_err(|_| {
                        Error::Validation(format!("Invalid input fingerprint in '{}'", path))
                    })?;
                    input_fingerprint = Fingerprint::from_int64(key);
                }
            }
        }
        let mut keys = CompositeKey::new();
        for (name, components) in &components {
            let key_type = self.key_types.get(name).ok_or_else(|| {
                Error::Validation(format!(
                    "No '{}' partition key found, expected one of {:?}",
                    name,
                    self.key_types.keys().collect::<Vec<_>>()
                ))
            })?;
            keys.insert(name.clone(), key_type.from_key_components(components)?);
        }
        if keys.len() != self.key_types.len() {
            return Err(Error::Validation(format!(
                "Expected to find partition keys for {:?}, only found {:?}. Is the partitioning spec ('{}') complete?",
                self.key_types.keys().collect::<Vec<_>>(),
                keys.keys().collect::<Vec<_>>(),
                self.spec
            )));
        }
        Ok((keys, input_fingerprint))
    }
}
