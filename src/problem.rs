//! Problem definition: the ordered list of calibrated parameters and their
//! bounds, plus the spatial group index that scoped parameters refer to.
//!
//! # Line Format
//!
//! ```text
//! # name, change_type, lower_bound, upper_bound[, scope]
//! esco, absval, 0.0, 1.0
//! cn2, pctchg, -20, 20, hru|down1_agri
//! cn2|hru|up_forest, pctchg, -10, 10
//! ```
//!
//! Blank lines and `#` comments are ignored. Malformed lines are skipped with
//! a warning; duplicate parameter labels are a configuration error.

use crate::error::{Result, SweepError};
use crate::types::ChangeType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Spatial-unit scope of a parameter: a named group of one object type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpatialScope {
    /// Object type, e.g. `hru` or `rte`
    pub object_type: String,
    /// Group name inside the object type's group file
    pub group: String,
}

impl SpatialScope {
    /// Parse `object_type|group`
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split('|').map(str::trim);
        let object_type = parts.next()?;
        let group = parts.next()?;
        if parts.next().is_some() || object_type.is_empty() || group.is_empty() {
            return None;
        }
        Some(Self {
            object_type: object_type.to_string(),
            group: group.to_string(),
        })
    }
}

impl fmt::Display for SpatialScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.object_type, self.group)
    }
}

/// One calibrated parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub change_type: ChangeType,
    pub lower_bound: f64,
    pub upper_bound: f64,
    #[serde(default)]
    pub scope: Option<SpatialScope>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, change_type: ChangeType, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            change_type,
            lower_bound: lower,
            upper_bound: upper,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: SpatialScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Unique key of this parameter within a definition
    pub fn label(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{}|{}", self.name, scope),
            None => self.name.clone(),
        }
    }

    /// Map a unit-interval coordinate into `[lower_bound, upper_bound]`.
    pub fn scale(&self, unit: f64) -> f64 {
        let unit = unit.clamp(0.0, 1.0);
        let value = self.lower_bound + unit * (self.upper_bound - self.lower_bound);
        value.clamp(self.lower_bound, self.upper_bound)
    }

    /// Inverse of `scale`
    pub fn normalize(&self, value: f64) -> f64 {
        (value - self.lower_bound) / (self.upper_bound - self.lower_bound)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower_bound && value <= self.upper_bound
    }
}

/// A line of the definition file that was not turned into a parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub line_number: usize,
    pub content: String,
    pub reason: String,
}

/// Ordered, label-unique list of parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProblemDefinition {
    parameters: Vec<Parameter>,
}

impl ProblemDefinition {
    /// Build a definition, rejecting duplicate labels.
    pub fn new(parameters: Vec<Parameter>) -> Result<Self> {
        let mut seen = HashSet::new();
        for param in &parameters {
            let label = param.label();
            if !seen.insert(label.clone()) {
                return Err(SweepError::config(format!(
                    "Duplicate parameter '{}' in problem definition",
                    label
                )));
            }
        }
        Ok(Self { parameters })
    }

    /// Parse definition text, logging each skipped line.
    pub fn parse(text: &str) -> Result<Self> {
        let (definition, skipped) = Self::parse_report(text)?;
        for line in &skipped {
            warn!(
                "Skipping malformed parameter line {} ({}): {}",
                line.line_number, line.reason, line.content
            );
        }
        Ok(definition)
    }

    /// Parse definition text and return the skipped lines to the caller.
    pub fn parse_report(text: &str) -> Result<(Self, Vec<SkippedLine>)> {
        let mut parameters = Vec::new();
        let mut skipped = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line) {
                Ok(param) => parameters.push(param),
                Err(reason) => skipped.push(SkippedLine {
                    line_number: idx + 1,
                    content: line.to_string(),
                    reason,
                }),
            }
        }

        debug!(
            "Parsed {} parameters ({} lines skipped)",
            parameters.len(),
            skipped.len()
        );
        Ok((Self::new(parameters)?, skipped))
    }

    /// Load and parse a definition file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            SweepError::config(format!(
                "Failed to read problem definition {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&text)
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.parameters.iter().map(Parameter::label).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }
}

fn parse_line(line: &str) -> std::result::Result<Parameter, String> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() != 4 && parts.len() != 5 {
        return Err(format!("expected 4 or 5 fields, found {}", parts.len()));
    }

    let change_type: ChangeType = parts[1]
        .parse()
        .map_err(|_| format!("unknown change type '{}'", parts[1]))?;
    let lower: f64 = parts[2]
        .parse()
        .map_err(|_| format!("lower bound '{}' is not a number", parts[2]))?;
    let upper: f64 = parts[3]
        .parse()
        .map_err(|_| format!("upper bound '{}' is not a number", parts[3]))?;
    if !lower.is_finite() || !upper.is_finite() {
        return Err("bounds must be finite".to_string());
    }
    if lower >= upper {
        return Err(format!("lower bound {} is not below upper bound {}", lower, upper));
    }

    // Legacy form folds the scope into the name: `cn2|hru|group`
    let (name, legacy_scope) = match parts[0].split_once('|') {
        Some((name, rest)) => {
            let scope = SpatialScope::parse(rest)
                .ok_or_else(|| format!("malformed scoped name '{}'", parts[0]))?;
            (name.trim(), Some(scope))
        }
        None => (parts[0], None),
    };
    if name.is_empty() {
        return Err("empty parameter name".to_string());
    }
    // Calibration rows are whitespace separated
    if name.chars().any(char::is_whitespace) {
        return Err(format!("parameter name '{}' contains whitespace", name));
    }

    let column_scope = match parts.get(4) {
        Some(raw) if !raw.is_empty() => Some(
            SpatialScope::parse(raw).ok_or_else(|| format!("malformed scope '{}'", raw))?,
        ),
        _ => None,
    };

    let scope = match (legacy_scope, column_scope) {
        (Some(_), Some(_)) => return Err("scope given both in name and column".to_string()),
        (a, b) => a.or(b),
    };

    let mut param = Parameter::new(name, change_type, lower, upper);
    param.scope = scope;
    Ok(param)
}

/// Resolves spatial scopes to concrete unit ids
///
/// Group files map group names to objects holding an id list:
/// `{"down1_agri": {"hru_ids": [1, 2, 3]}}`.
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    groups: BTreeMap<String, BTreeMap<String, Vec<u64>>>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the id list field for an object type
    pub fn id_field(object_type: &str) -> &'static str {
        match object_type {
            "hru" => "hru_ids",
            "rte" => "channel_ids",
            _ => "ids",
        }
    }

    /// Register the ids of one group directly
    pub fn insert(&mut self, object_type: &str, group: &str, ids: Vec<u64>) {
        self.groups
            .entry(object_type.to_string())
            .or_default()
            .insert(group.to_string(), ids);
    }

    /// Load one object type's group file. Groups without a usable id list
    /// are skipped with a warning and will fail to resolve later.
    pub fn load_groups(&mut self, object_type: &str, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path).map_err(|e| {
            SweepError::config(format!(
                "Failed to read spatial group file {}: {}",
                path.display(),
                e
            ))
        })?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        let object = value.as_object().ok_or_else(|| {
            SweepError::config(format!("{} must hold a JSON object", path.display()))
        })?;

        let field = Self::id_field(object_type);
        for (group, entry) in object {
            let Some(raw) = entry.get(field).and_then(|v| v.as_array()) else {
                warn!(
                    "Group '{}' in {} has no '{}' list",
                    group,
                    path.display(),
                    field
                );
                continue;
            };
            let ids = raw
                .iter()
                .map(|v| {
                    v.as_u64().ok_or_else(|| {
                        SweepError::config(format!(
                            "Group '{}' in {} has invalid unit id {}",
                            group,
                            path.display(),
                            v
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            self.insert(object_type, group, ids);
        }
        Ok(())
    }

    /// Concrete unit ids for a scope, or `None` when it resolves to nothing
    pub fn resolve(&self, scope: &SpatialScope) -> Option<&[u64]> {
        self.groups
            .get(&scope.object_type)
            .and_then(|groups| groups.get(&scope.group))
            .map(Vec::as_slice)
            .filter(|ids| !ids.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_basic_definition() {
        let text = "\
# calibration parameters
esco, absval, 0.0, 1.0

cn2, pctchg, -20, 20, hru|down1_agri
";
        let def = ProblemDefinition::parse(text).unwrap();
        assert_eq!(def.len(), 2);
        assert_eq!(def.parameters()[0].name, "esco");
        assert_eq!(def.parameters()[0].change_type, ChangeType::Absval);
        assert!(def.parameters()[0].scope.is_none());
        assert_eq!(def.parameters()[1].label(), "cn2|hru|down1_agri");
    }

    #[test]
    fn test_legacy_scoped_name() {
        let def = ProblemDefinition::parse("cn2|hru|up_forest, pctchg, -10, 10").unwrap();
        let p = &def.parameters()[0];
        assert_eq!(p.name, "cn2");
        assert_eq!(
            p.scope,
            Some(SpatialScope {
                object_type: "hru".into(),
                group: "up_forest".into()
            })
        );
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let text = "\
esco, absval, 0.0, 1.0
too, few, fields
surlag, absval, abc, 2
alpha, percent, 0, 1
flipped, absval, 5, 1
bad|scope, absval, 0, 1
epco, absval, 0, 1
";
        let (def, skipped) = ProblemDefinition::parse_report(text).unwrap();
        assert_eq!(def.labels(), vec!["esco", "epco"]);
        assert_eq!(skipped.len(), 5);
        assert_eq!(skipped[0].line_number, 2);
    }

    #[test]
    fn test_whitespace_in_name_is_skipped() {
        let (def, skipped) =
            ProblemDefinition::parse_report("soil k, absval, 0, 1\nesco, absval, 0, 1\n").unwrap();
        assert_eq!(def.labels(), vec!["esco"]);
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].reason.contains("whitespace"));
    }

    #[test]
    fn test_duplicate_labels_are_fatal() {
        let err = ProblemDefinition::parse("esco, absval, 0, 1\nesco, absval, 0, 2").unwrap_err();
        assert!(err.is_configuration());

        // Same name in two scopes is fine
        let def = ProblemDefinition::parse(
            "cn2, pctchg, -5, 5, hru|a\ncn2, pctchg, -5, 5, hru|b",
        )
        .unwrap();
        assert_eq!(def.len(), 2);
    }

    #[test]
    fn test_empty_definition_parses() {
        let def = ProblemDefinition::parse("# nothing here\n\n").unwrap();
        assert!(def.is_empty());
    }

    #[test]
    fn test_scale_stays_in_bounds() {
        let p = Parameter::new("cn2", ChangeType::Pctchg, -20.0, 20.0);
        assert_eq!(p.scale(0.0), -20.0);
        assert_eq!(p.scale(1.0), 20.0);
        assert_eq!(p.scale(0.5), 0.0);
        assert_eq!(p.scale(1.5), 20.0);
        assert!((p.normalize(10.0) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_spatial_index_resolution() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hru_combinations.json");
        fs::write(
            &path,
            r#"{"down1_agri": {"hru_ids": [3, 4, 5]}, "empty": {"hru_ids": []}, "odd": {"x": 1}}"#,
        )
        .unwrap();

        let mut index = SpatialIndex::new();
        index.load_groups("hru", &path).unwrap();

        let scope = SpatialScope::parse("hru|down1_agri").unwrap();
        assert_eq!(index.resolve(&scope), Some(&[3u64, 4, 5][..]));
        assert!(index.resolve(&SpatialScope::parse("hru|empty").unwrap()).is_none());
        assert!(index.resolve(&SpatialScope::parse("hru|odd").unwrap()).is_none());
        assert!(index.resolve(&SpatialScope::parse("rte|down1_agri").unwrap()).is_none());
    }

    #[test]
    fn test_non_integer_unit_id_is_a_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hru_combinations.json");
        fs::write(&path, r#"{"forest": {"hru_ids": [3, "4", -5]}}"#).unwrap();

        let mut index = SpatialIndex::new();
        let err = index.load_groups("hru", &path).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("forest"));
    }
}
