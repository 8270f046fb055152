//! Parameter definition, display-name resolution, and the cross-product
//! iterator that drives scene construction.
//!
//! A definition is an ordered mapping `name -> values`. Values come either
//! as a plain sequence (primitives only; the display name is the value's
//! string form) or as `(display name, value)` pairs for anything that needs
//! an explicit label. Resolution validates the definition once and yields
//! two parallel ordered lists: raw values (passed to workloads by identity)
//! and display names (what appears in results and error coordinates).
//!
//! Cross-product order is major-to-minor in key insertion order: the first
//! parameter advances slowest. Scene results align to this order, so it is
//! a public contract rather than an implementation detail.

use std::error::Error;
use std::fmt;

use crate::types::BenchValue;

/// Variable names reserved for the result table; parameters may not use them.
pub const RESERVED_VARS: [&str; 3] = ["Name", "Builder", "Executor"];

/// One parameter's values, in declaration order.
#[derive(Debug, Clone)]
pub enum ParamValues {
    /// Primitive values whose display names are their string forms.
    Plain(Vec<BenchValue>),
    /// Explicitly labelled values; required for lists and maps.
    Named(Vec<(String, BenchValue)>),
}

/// An ordered parameter definition.
///
/// ```
/// use scenebench::ParamsDef;
///
/// let params = ParamsDef::new()
///     .param("size", [100usize, 1000, 10_000])
///     .param("cached", [false, true]);
/// assert_eq!(params.resolve().unwrap().combination_count(), 6);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParamsDef {
    entries: Vec<(String, ParamValues)>,
}

/// Rejection reasons for a parameter definition.
#[derive(Debug)]
pub enum ParamsError {
    /// A parameter key was empty or whitespace.
    EmptyKey,
    /// A parameter key collided with a reserved variable name.
    ReservedKey(String),
    /// A parameter had no values.
    EmptyValues(String),
    /// Two values of one parameter produced the same display name.
    DuplicateDisplayName {
        /// The parameter the collision occurred in.
        param: String,
        /// The colliding display name (after trimming).
        name: String,
    },
    /// A list or map value was given without an explicit display name.
    MissingDisplayName(String),
}

impl fmt::Display for ParamsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamsError::EmptyKey => write!(f, "parameter keys must be non-empty strings"),
            ParamsError::ReservedKey(key) => {
                write!(f, "parameter key {key:?} is reserved for the result table")
            }
            ParamsError::EmptyValues(key) => {
                write!(f, "parameter {key:?} must have at least one value")
            }
            ParamsError::DuplicateDisplayName { param, name } => {
                write!(f, "duplicate display name {name:?} in parameter {param:?}")
            }
            ParamsError::MissingDisplayName(key) => write!(
                f,
                "parameter {key:?} contains a non-primitive value; use named values to label it"
            ),
        }
    }
}

impl Error for ParamsError {}

impl ParamsDef {
    /// Create an empty definition (a single, parameterless combination).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter with plain values.
    pub fn param<N, I, V>(mut self, name: N, values: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<BenchValue>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.entries.push((name.into(), ParamValues::Plain(values)));
        self
    }

    /// Append a parameter with explicitly named values.
    pub fn named_param<N, I, D, V>(mut self, name: N, values: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (D, V)>,
        D: Into<String>,
        V: Into<BenchValue>,
    {
        let values = values
            .into_iter()
            .map(|(d, v)| (d.into(), v.into()))
            .collect();
        self.entries.push((name.into(), ParamValues::Named(values)));
        self
    }

    /// Whether the definition has no parameters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate the definition and assign display names.
    pub fn resolve(&self) -> Result<ResolvedParams, ParamsError> {
        let mut raw = Vec::with_capacity(self.entries.len());
        let mut display = Vec::with_capacity(self.entries.len());

        for (key, values) in &self.entries {
            if key.trim().is_empty() {
                return Err(ParamsError::EmptyKey);
            }
            if RESERVED_VARS.contains(&key.as_str()) {
                return Err(ParamsError::ReservedKey(key.clone()));
            }

            let mut raw_values = Vec::new();
            let mut names = Vec::new();
            match values {
                ParamValues::Plain(list) => {
                    for value in list {
                        let name = value
                            .display_name()
                            .ok_or_else(|| ParamsError::MissingDisplayName(key.clone()))?;
                        names.push(name);
                        raw_values.push(value.clone());
                    }
                }
                ParamValues::Named(list) => {
                    for (name, value) in list {
                        names.push(name.trim().to_string());
                        raw_values.push(value.clone());
                    }
                }
            }

            if raw_values.is_empty() {
                return Err(ParamsError::EmptyValues(key.clone()));
            }
            for (i, name) in names.iter().enumerate() {
                if names[..i].contains(name) {
                    return Err(ParamsError::DuplicateDisplayName {
                        param: key.clone(),
                        name: name.clone(),
                    });
                }
            }

            raw.push((key.clone(), raw_values));
            display.push((key.clone(), names));
        }

        Ok(ResolvedParams { raw, display })
    }
}

/// A single parameter assignment, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    entries: Vec<(String, BenchValue)>,
}

impl Assignment {
    /// Look up a parameter's raw value.
    pub fn get(&self, name: &str) -> Option<&BenchValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Iterate `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BenchValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of assigned parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the assignment carries no parameters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Display-name coordinates of a parameter assignment, in declaration order.
pub type Coordinates = Vec<(String, String)>;

/// Render coordinates as `key=value, key=value` for logs and errors.
pub fn format_coordinates(coords: &[(String, String)]) -> String {
    if coords.is_empty() {
        return "(no parameters)".to_string();
    }
    coords
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A validated parameter definition with assigned display names.
#[derive(Debug, Clone)]
pub struct ResolvedParams {
    raw: Vec<(String, Vec<BenchValue>)>,
    display: Vec<(String, Vec<String>)>,
}

impl ResolvedParams {
    /// The ordered `(key, display names)` lists, as they appear in results.
    pub fn display(&self) -> &[(String, Vec<String>)] {
        &self.display
    }

    /// The ordered `(key, raw values)` lists.
    pub fn raw(&self) -> &[(String, Vec<BenchValue>)] {
        &self.raw
    }

    /// Number of parameter combinations the cross-product yields.
    pub fn combination_count(&self) -> usize {
        self.raw.iter().map(|(_, values)| values.len()).product()
    }

    /// Lazy cross-product iterator over `(raw assignment, coordinates)`.
    ///
    /// The first key advances slowest; an empty definition yields exactly
    /// one empty assignment.
    pub fn combinations(&self) -> CrossProduct<'_> {
        CrossProduct {
            resolved: self,
            cursor: vec![0; self.raw.len()],
            done: false,
        }
    }
}

/// Iterator over every parameter combination, major-to-minor.
#[derive(Debug)]
pub struct CrossProduct<'a> {
    resolved: &'a ResolvedParams,
    cursor: Vec<usize>,
    done: bool,
}

impl Iterator for CrossProduct<'_> {
    type Item = (Assignment, Coordinates);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut entries = Vec::with_capacity(self.cursor.len());
        let mut coords = Vec::with_capacity(self.cursor.len());
        for (axis, &position) in self.cursor.iter().enumerate() {
            let (key, values) = &self.resolved.raw[axis];
            let (_, names) = &self.resolved.display[axis];
            entries.push((key.clone(), values[position].clone()));
            coords.push((key.clone(), names[position].clone()));
        }

        // Advance minor-first; the first key rolls over last.
        self.done = true;
        for axis in (0..self.cursor.len()).rev() {
            self.cursor[axis] += 1;
            if self.cursor[axis] < self.resolved.raw[axis].1.len() {
                self.done = false;
                break;
            }
            self.cursor[axis] = 0;
        }

        Some((Assignment { entries }, coords))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_definition_yields_one_combination() {
        let resolved = ParamsDef::new().resolve().unwrap();
        assert_eq!(resolved.combination_count(), 1);

        let combos: Vec<_> = resolved.combinations().collect();
        assert_eq!(combos.len(), 1);
        assert!(combos[0].0.is_empty());
        assert!(combos[0].1.is_empty());
    }

    #[test]
    fn test_cross_product_order_first_key_slowest() {
        let resolved = ParamsDef::new()
            .param("a", [1, 2])
            .param("b", ["x", "y", "z"])
            .resolve()
            .unwrap();
        assert_eq!(resolved.combination_count(), 6);

        let coords: Vec<String> = resolved
            .combinations()
            .map(|(_, c)| format_coordinates(&c))
            .collect();
        assert_eq!(
            coords,
            [
                "a=1, b=x", "a=1, b=y", "a=1, b=z",
                "a=2, b=x", "a=2, b=y", "a=2, b=z",
            ]
        );
    }

    #[test]
    fn test_raw_values_reach_assignments() {
        let resolved = ParamsDef::new()
            .named_param("buf", [
                ("small", BenchValue::from(vec![0; 4])),
                ("big", BenchValue::from(vec![0; 64])),
            ])
            .resolve()
            .unwrap();

        let combos: Vec<_> = resolved.combinations().collect();
        assert_eq!(combos.len(), 2);
        match combos[0].0.get("buf").unwrap() {
            BenchValue::List(items) => assert_eq!(items.len(), 4),
            other => panic!("unexpected value: {other:?}"),
        }
        assert_eq!(combos[0].1, vec![("buf".to_string(), "small".to_string())]);
    }

    #[test]
    fn test_reserved_key_rejected() {
        for key in RESERVED_VARS {
            let err = ParamsDef::new().param(key, [1]).resolve().unwrap_err();
            assert!(matches!(err, ParamsError::ReservedKey(_)), "{err}");
        }
    }

    #[test]
    fn test_blank_key_rejected() {
        let err = ParamsDef::new().param("  ", [1]).resolve().unwrap_err();
        assert!(matches!(err, ParamsError::EmptyKey));
    }

    #[test]
    fn test_empty_values_rejected() {
        let err = ParamsDef::new()
            .param("n", Vec::<i32>::new())
            .resolve()
            .unwrap_err();
        assert!(matches!(err, ParamsError::EmptyValues(_)));
    }

    #[test]
    fn test_duplicate_display_name_rejected() {
        let err = ParamsDef::new()
            .named_param("n", [("one", 1), ("one ", 2)])
            .resolve()
            .unwrap_err();
        assert!(matches!(err, ParamsError::DuplicateDisplayName { .. }));
    }

    #[test]
    fn test_non_primitive_needs_display_name() {
        let err = ParamsDef::new()
            .param("data", [BenchValue::from(vec![1, 2, 3])])
            .resolve()
            .unwrap_err();
        assert!(matches!(err, ParamsError::MissingDisplayName(_)));
    }

    #[test]
    fn test_format_coordinates() {
        assert_eq!(format_coordinates(&[]), "(no parameters)");
        let coords = vec![("size".into(), "100".into()), ("mode".into(), "fast".into())];
        assert_eq!(format_coordinates(&coords), "size=100, mode=fast");
    }
}
