//! Shard path templates and the shard router.
//!
//! A template is literal text with `{{ ... }}` actions that are replaced by
//! parts of a reading. The default layout files one hour of one source per
//! shard:
//!
//! ```text
//! {{Year .Epoch}}/{{Year .Epoch}}.{{Doy .Epoch}}/{{Year .Epoch}}.{{Doy .Epoch}}.{{Hour .Epoch}}.{{.Source}}.csv
//! ```
//!
//! # Actions
//!
//! | Action              | Expands to                                         |
//! |---------------------|----------------------------------------------------|
//! | `.Source`           | the full source identifier                         |
//! | `.Epoch`            | the canonical timestamp text                       |
//! | `Year .Epoch`       | calendar functions: `Year Month Day Doy Hour Minute Second`, UTC, zero padded |
//! | `Network .`         | identity functions: `Network Station Location Channel` |
//!
//! The argument of a function call may be left out, so `{{Doy}}` is the
//! same as `{{Doy .Epoch}}`.
//!
//! Functions are resolved against a [`FunctionTable`] handed to the compiler;
//! there is no global registry. All lookup happens in
//! [`Template::compile`], so a bad template fails once at startup and
//! rendering can never fail.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Utc};

use crate::error::{Result, TemplateError};
use crate::reading::Reading;

/// A function of a reading's epoch.
pub type CalendarFn = fn(&DateTime<Utc>) -> String;

/// A function of a reading's source identity.
pub type IdentityFn = fn(&Reading) -> String;

const EPOCH_ARGUMENT: &str = ".Epoch";
const READING_ARGUMENT: &str = ".";

#[derive(Debug, Clone, Copy)]
enum Function {
    Calendar(CalendarFn),
    Identity(IdentityFn),
}

/// Named functions available to templates.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: BTreeMap<String, Function>,
}

impl FunctionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard calendar and identity functions.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table
            .insert_calendar("Year", |t| t.format("%Y").to_string())
            .insert_calendar("Month", |t| t.format("%m").to_string())
            .insert_calendar("Day", |t| t.format("%d").to_string())
            .insert_calendar("Doy", |t| format!("{:03}", t.ordinal()))
            .insert_calendar("Hour", |t| t.format("%H").to_string())
            .insert_calendar("Minute", |t| t.format("%M").to_string())
            .insert_calendar("Second", |t| t.format("%S").to_string())
            .insert_identity("Network", |r| r.network().to_string())
            .insert_identity("Station", |r| r.station().to_string())
            .insert_identity("Location", |r| r.location().to_string())
            .insert_identity("Channel", |r| r.channel().to_string());
        table
    }

    /// Adds or replaces a function taking `.Epoch`.
    pub fn insert_calendar(&mut self, name: impl Into<String>, function: CalendarFn) -> &mut Self {
        self.functions
            .insert(name.into(), Function::Calendar(function));
        self
    }

    /// Adds or replaces a function taking the whole reading (`.`).
    pub fn insert_identity(&mut self, name: impl Into<String>, function: IdentityFn) -> &mut Self {
        self.functions
            .insert(name.into(), Function::Identity(function));
        self
    }

    /// Whether `name` is defined.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Defined function names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    fn get(&self, name: &str) -> Option<Function> {
        self.functions.get(name).copied()
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Source,
    Epoch,
    Call(Function),
}

/// A compiled shard path template.
#[derive(Clone)]
pub struct Template {
    text: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Compiles `text` against `functions`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] if the text is empty, an action is not
    /// closed, names an unknown field or function, passes the wrong argument,
    /// or has the wrong number of tokens.
    pub fn compile(text: &str, functions: &FunctionTable) -> Result<Self> {
        if text.is_empty() {
            return Err(TemplateError::Empty.into());
        }

        let mut segments = Vec::new();
        let mut rest = text;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }

            let open = offset + start;
            let body = &rest[start + 2..];
            let end = body
                .find("}}")
                .ok_or(TemplateError::Unterminated { offset: open })?;
            segments.push(compile_action(&body[..end], open, functions)?);

            let consumed = start + 2 + end + 2;
            rest = &rest[consumed..];
            offset += consumed;
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            text: text.to_string(),
            segments,
        })
    }

    /// The template text this was compiled from.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Expands the template for `reading`.
    pub fn render(&self, reading: &Reading) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Source => out.push_str(&reading.source),
                Segment::Epoch => out.push_str(&reading.timestamp()),
                Segment::Call(Function::Calendar(f)) => out.push_str(&f(&reading.epoch)),
                Segment::Call(Function::Identity(f)) => out.push_str(&f(reading)),
            }
        }
        out
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template").field("text", &self.text).finish()
    }
}

fn compile_action(
    action: &str,
    offset: usize,
    functions: &FunctionTable,
) -> std::result::Result<Segment, TemplateError> {
    let tokens: Vec<&str> = action.split_whitespace().collect();

    match tokens.as_slice() {
        [field] if field.starts_with('.') => compile_field(field, offset),
        [name] => lookup(functions, name, offset).map(Segment::Call),
        [name, argument] if !name.starts_with('.') => {
            let function = lookup(functions, name, offset)?;
            let expected = match function {
                Function::Calendar(_) => EPOCH_ARGUMENT,
                Function::Identity(_) => READING_ARGUMENT,
            };
            if *argument != expected {
                return Err(TemplateError::InvalidArgument {
                    name: (*name).to_string(),
                    argument: (*argument).to_string(),
                    expected: expected.to_string(),
                });
            }
            Ok(Segment::Call(function))
        }
        _ => Err(TemplateError::MalformedAction {
            action: action.to_string(),
            offset,
        }),
    }
}

fn compile_field(field: &str, offset: usize) -> std::result::Result<Segment, TemplateError> {
    match field {
        ".Source" => Ok(Segment::Source),
        ".Epoch" => Ok(Segment::Epoch),
        _ => Err(TemplateError::UnknownField {
            field: field.to_string(),
            offset,
        }),
    }
}

fn lookup(
    functions: &FunctionTable,
    name: &str,
    offset: usize,
) -> std::result::Result<Function, TemplateError> {
    functions
        .get(name)
        .ok_or_else(|| TemplateError::UnknownFunction {
            name: name.to_string(),
            offset,
        })
}

/// Maps readings to the relative path of the shard file they belong in.
#[derive(Debug, Clone)]
pub struct ShardRouter {
    template: Template,
}

impl ShardRouter {
    /// Creates a router from template text and a function table.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] if the template does not compile.
    pub fn new(template: &str, functions: &FunctionTable) -> Result<Self> {
        Ok(Self {
            template: Template::compile(template, functions)?,
        })
    }

    /// Creates a router using [`FunctionTable::standard`].
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] if the template does not compile.
    pub fn standard(template: &str) -> Result<Self> {
        Self::new(template, &FunctionTable::standard())
    }

    /// The compiled template.
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Relative path of the shard `reading` belongs in.
    pub fn route(&self, reading: &Reading) -> String {
        self.template.render(reading)
    }

    /// Groups readings by shard path.
    ///
    /// Readings within a bucket keep their input order.
    pub fn partition<I>(&self, readings: I) -> BTreeMap<String, Vec<Reading>>
    where
        I: IntoIterator<Item = Reading>,
    {
        let mut shards: BTreeMap<String, Vec<Reading>> = BTreeMap::new();
        for reading in readings {
            shards.entry(self.route(&reading)).or_default().push(reading);
        }
        shards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_TEMPLATE;
    use crate::error::ShardError;
    use chrono::TimeZone;

    fn reading() -> Reading {
        let epoch = Utc.with_ymd_and_hms(2016, 8, 2, 4, 5, 6).unwrap();
        Reading::new("NZ_APIM_50_LFZ", epoch, 1.0)
    }

    fn compile_err(text: &str) -> TemplateError {
        match Template::compile(text, &FunctionTable::standard()) {
            Err(ShardError::Template(e)) => e,
            other => panic!("expected template error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_template() {
        let router = ShardRouter::standard(DEFAULT_TEMPLATE).unwrap();
        assert_eq!(
            router.route(&reading()),
            "2016/2016.215/2016.215.04.NZ_APIM_50_LFZ.csv"
        );
    }

    #[test]
    fn test_calendar_functions() {
        let router = ShardRouter::standard(
            "{{Year .Epoch}}-{{Month .Epoch}}-{{Day .Epoch}} {{Hour .Epoch}}:{{Minute .Epoch}}:{{Second .Epoch}} {{Doy .Epoch}}",
        )
        .unwrap();
        assert_eq!(router.route(&reading()), "2016-08-02 04:05:06 215");
    }

    #[test]
    fn test_doy_is_zero_padded() {
        let router = ShardRouter::standard("{{Doy .Epoch}}").unwrap();
        let r = Reading::new("a", Utc.with_ymd_and_hms(2020, 1, 9, 0, 0, 0).unwrap(), 0.0);
        assert_eq!(router.route(&r), "009");
    }

    #[test]
    fn test_identity_functions() {
        let router =
            ShardRouter::standard("{{Network .}}/{{Station .}}/{{Location .}}/{{Channel .}}")
                .unwrap();
        assert_eq!(router.route(&reading()), "NZ/APIM/50/LFZ");

        let short = Reading::new("NZ", reading().epoch, 0.0);
        assert_eq!(router.route(&short), "NZ///");
    }

    #[test]
    fn test_fields_and_implicit_arguments() {
        let router = ShardRouter::standard("{{ .Source }}@{{.Epoch}}/{{Year}}/{{Network}}").unwrap();
        assert_eq!(
            router.route(&reading()),
            "NZ_APIM_50_LFZ@2016-08-02T04:05:06Z/2016/NZ"
        );
    }

    #[test]
    fn test_literal_only() {
        let router = ShardRouter::standard("all.csv").unwrap();
        assert_eq!(router.route(&reading()), "all.csv");
    }

    #[test]
    fn test_template_errors() {
        assert_eq!(
            compile_err("{{Week .Epoch}}"),
            TemplateError::UnknownFunction {
                name: "Week".to_string(),
                offset: 0
            }
        );
        assert_eq!(
            compile_err("x/{{.Value}}"),
            TemplateError::UnknownField {
                field: ".Value".to_string(),
                offset: 2
            }
        );
        assert_eq!(
            compile_err("{{Year .}}"),
            TemplateError::InvalidArgument {
                name: "Year".to_string(),
                argument: ".".to_string(),
                expected: ".Epoch".to_string()
            }
        );
        assert_eq!(
            compile_err("{{Network .Epoch}}"),
            TemplateError::InvalidArgument {
                name: "Network".to_string(),
                argument: ".Epoch".to_string(),
                expected: ".".to_string()
            }
        );
        assert_eq!(compile_err("ab{{Year"), TemplateError::Unterminated { offset: 2 });
        assert!(matches!(
            compile_err("{{ }}"),
            TemplateError::MalformedAction { .. }
        ));
        assert!(matches!(
            compile_err("{{Year .Epoch extra}}"),
            TemplateError::MalformedAction { .. }
        ));
        assert_eq!(compile_err(""), TemplateError::Empty);
    }

    #[test]
    fn test_custom_function_table() {
        let mut table = FunctionTable::new();
        table.insert_calendar("Decade", |t| format!("{}0s", t.year() / 10));
        assert!(table.contains("Decade"));
        assert!(!table.contains("Year"));

        let router = ShardRouter::new("{{Decade .Epoch}}/{{.Source}}", &table).unwrap();
        assert_eq!(router.route(&reading()), "2010s/NZ_APIM_50_LFZ");

        assert!(ShardRouter::new("{{Year .Epoch}}", &table).is_err());
    }

    #[test]
    fn test_standard_names() {
        let table = FunctionTable::standard();
        let names: Vec<&str> = table.names().collect();
        assert_eq!(names.len(), 11);
        assert!(names.contains(&"Doy"));
        assert!(names.contains(&"Channel"));
    }

    #[test]
    fn test_partition() {
        let router = ShardRouter::standard("{{Hour .Epoch}}.{{.Source}}").unwrap();
        let base = Utc.with_ymd_and_hms(2016, 8, 2, 4, 59, 59).unwrap();
        let readings = vec![
            Reading::new("a", base, 1.0),
            Reading::new("b", base, 2.0),
            Reading::new("a", base + chrono::Duration::seconds(1), 3.0),
            Reading::new("a", base - chrono::Duration::seconds(1), 4.0),
        ];

        let shards = router.partition(readings);
        let paths: Vec<&str> = shards.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["04.a", "04.b", "05.a"]);
        assert_eq!(shards["04.a"].len(), 2);
        assert_eq!(shards["04.a"][0].value, 1.0);
        assert_eq!(shards["04.a"][1].value, 4.0);
        assert_eq!(shards["05.a"][0].value, 3.0);
    }
}
