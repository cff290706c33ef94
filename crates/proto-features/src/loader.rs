//! Declaration tree manifests
//!
//! A manifest is a YAML or JSON description of one `.proto` file, used where no
//! parser is at hand (tests, the CLI). It is converted into a [`Root`] with the
//! same builder calls a parser would make.

use crate::{Error, Result};
use proto_ir::{EntityId, Root};
use serde::de;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

/// Raw token of an option value. YAML users may write `2023` or `true`
/// unquoted, so integers and booleans are accepted and kept as their source
/// text. Floats are rejected: their source text cannot be recovered once
/// parsed, so they must be quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OptionToken(String);

impl<'de> Deserialize<'de> for OptionToken {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TokenVisitor;

        impl de::Visitor<'_> for TokenVisitor {
            type Value = OptionToken;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a string, integer or boolean option value")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Self::Value, E> {
                Ok(OptionToken(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                Ok(OptionToken(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                Ok(OptionToken(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Self::Value, E> {
                Err(E::custom(format!(
                    "floating point option value {v} must be quoted"
                )))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                Ok(OptionToken(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Self::Value, E> {
                Ok(OptionToken(v))
            }
        }

        deserializer.deserialize_any(TokenVisitor)
    }
}

/// Option statements of one declaration, in the order they were written
#[derive(Debug, Default)]
struct OptionsFile(Vec<(String, OptionToken)>);

impl<'de> Deserialize<'de> for OptionsFile {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StatementsVisitor;

        impl<'de> de::Visitor<'de> for StatementsVisitor {
            type Value = OptionsFile;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a mapping of option paths to values")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                let mut statements = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(statement) = map.next_entry::<String, OptionToken>()? {
                    statements.push(statement);
                }
                Ok(OptionsFile(statements))
            }
        }

        deserializer.deserialize_map(StatementsVisitor)
    }
}

impl<'a> IntoIterator for &'a OptionsFile {
    type Item = &'a (String, OptionToken);
    type IntoIter = std::slice::Iter<'a, (String, OptionToken)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(default)]
    edition: Option<OptionToken>,
    #[serde(default)]
    syntax: Option<String>,
    #[serde(default)]
    package: Option<String>,
    #[serde(default)]
    options: OptionsFile,
    #[serde(default)]
    messages: Vec<MessageFile>,
    #[serde(default)]
    enums: Vec<EnumFile>,
    #[serde(default)]
    services: Vec<ServiceFile>,
    #[serde(default)]
    extensions: Vec<ExtendFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MessageFile {
    name: String,
    #[serde(default)]
    options: OptionsFile,
    #[serde(default)]
    fields: Vec<FieldFile>,
    #[serde(default)]
    oneofs: Vec<OneOfFile>,
    #[serde(default)]
    messages: Vec<MessageFile>,
    #[serde(default)]
    enums: Vec<EnumFile>,
    #[serde(default)]
    extensions: Vec<ExtendFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldFile {
    name: String,
    number: u32,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    options: OptionsFile,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OneOfFile {
    name: String,
    #[serde(default)]
    options: OptionsFile,
    #[serde(default)]
    fields: Vec<FieldFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnumFile {
    name: String,
    #[serde(default)]
    options: OptionsFile,
    #[serde(default)]
    values: Vec<EnumValueFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnumValueFile {
    name: String,
    number: i32,
    #[serde(default)]
    options: OptionsFile,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceFile {
    name: String,
    #[serde(default)]
    options: OptionsFile,
    #[serde(default)]
    messages: Vec<MessageFile>,
    #[serde(default)]
    methods: Vec<MethodFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodFile {
    name: String,
    input_type: String,
    output_type: String,
    #[serde(default)]
    options: OptionsFile,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExtendFile {
    extendee: String,
    #[serde(default)]
    fields: Vec<FieldFile>,
}

/// Loads manifests from disk or from strings
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    search_paths: Vec<PathBuf>,
}

impl ManifestLoader {
    /// Create a loader that searches the given directories
    #[must_use]
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Add a search directory
    pub fn add_path(&mut self, path: PathBuf) {
        self.search_paths.push(path);
    }

    /// Find `<name>.yaml`, `<name>.yml` or `<name>.json` in the search paths and
    /// load it
    pub fn load(&self, name: &str) -> Result<Root> {
        let variations = [
            format!("{name}.yaml"),
            format!("{name}.yml"),
            format!("{name}.json"),
        ];

        for path in &self.search_paths {
            for variation in &variations {
                let file_path = path.join(variation);
                if file_path.exists() {
                    trace!("Found manifest file: {:?}", file_path);
                    return self.load_from_file(&file_path);
                }
            }
        }

        Err(Error::NotFound(format!(
            "{name} not found in search paths: {:?}",
            self.search_paths
        )))
    }

    /// Load a manifest file; `.yaml`/`.yml` is read as YAML, anything else as JSON
    pub fn load_from_file(&self, path: &Path) -> Result<Root> {
        info!("Loading manifest: {}", path.display());
        let content = std::fs::read_to_string(path)?;

        if path
            .extension()
            .is_some_and(|e| e == "yaml" || e == "yml")
        {
            self.load_from_yaml(&content)
        } else {
            self.load_from_json(&content)
        }
    }

    /// Build a tree from a JSON manifest
    pub fn load_from_json(&self, json: &str) -> Result<Root> {
        let manifest: ManifestFile = serde_json::from_str(json)
            .map_err(|e| Error::InvalidFormat(format!("JSON parse error: {e}")))?;
        build_root(manifest)
    }

    /// Build a tree from a YAML manifest
    pub fn load_from_yaml(&self, yaml: &str) -> Result<Root> {
        let manifest: ManifestFile = serde_yaml::from_str(yaml)
            .map_err(|e| Error::InvalidFormat(format!("YAML parse error: {e}")))?;
        build_root(manifest)
    }
}

impl Default for ManifestLoader {
    fn default() -> Self {
        Self::new(vec![PathBuf::from(".")])
    }
}

/// `extend` blocks are attached once every type exists, so an extension may
/// name a message declared further down the file.
struct PendingExtend {
    container: EntityId,
    extend: ExtendFile,
}

fn build_root(manifest: ManifestFile) -> Result<Root> {
    let edition = match (manifest.edition, manifest.syntax) {
        (Some(_), Some(_)) => {
            return Err(Error::InvalidFormat(
                "a manifest declares either 'edition' or 'syntax', not both".to_string(),
            ));
        }
        (Some(edition), None) => edition.0,
        (None, Some(syntax)) => syntax,
        (None, None) => "proto2".to_string(),
    };

    let mut root = Root::new(edition);
    declare_options(&mut root, EntityId::ROOT, &manifest.options)?;

    let scope = match &manifest.package {
        Some(package) => root.set_package(package)?,
        None => EntityId::ROOT,
    };

    let mut pending: Vec<PendingExtend> = manifest
        .extensions
        .into_iter()
        .map(|extend| PendingExtend {
            container: scope,
            extend,
        })
        .collect();

    for message in manifest.messages {
        add_message(&mut root, scope, message, &mut pending)?;
    }
    for enum_file in manifest.enums {
        add_enum(&mut root, scope, enum_file)?;
    }
    for service in manifest.services {
        let service_id = root.add_service(scope, &service.name)?;
        declare_options(&mut root, service_id, &service.options)?;
        for message in service.messages {
            add_message(&mut root, service_id, message, &mut pending)?;
        }
        for method in service.methods {
            let method_id = root.add_method(
                service_id,
                &method.name,
                &method.input_type,
                &method.output_type,
            )?;
            declare_options(&mut root, method_id, &method.options)?;
        }
    }

    for PendingExtend { container, extend } in pending {
        for field in extend.fields {
            let id = root.add_extension(
                container,
                &extend.extendee,
                &field.name,
                field.number,
                &field.type_name,
            )?;
            declare_options(&mut root, id, &field.options)?;
        }
    }

    debug!(
        "Built tree with {} entities (edition {})",
        root.len(),
        root.edition()
    );
    Ok(root)
}

fn add_message(
    root: &mut Root,
    parent: EntityId,
    message: MessageFile,
    pending: &mut Vec<PendingExtend>,
) -> Result<()> {
    let id = root.add_message(parent, &message.name)?;
    declare_options(root, id, &message.options)?;

    for field in message.fields {
        let field_id = root.add_field(id, &field.name, field.number, &field.type_name)?;
        declare_options(root, field_id, &field.options)?;
    }
    for oneof in message.oneofs {
        let oneof_id = root.add_oneof(id, &oneof.name)?;
        declare_options(root, oneof_id, &oneof.options)?;
        for field in oneof.fields {
            let field_id =
                root.add_oneof_field(oneof_id, &field.name, field.number, &field.type_name)?;
            declare_options(root, field_id, &field.options)?;
        }
    }
    for nested in message.messages {
        add_message(root, id, nested, pending)?;
    }
    for enum_file in message.enums {
        add_enum(root, id, enum_file)?;
    }
    pending.extend(
        message
            .extensions
            .into_iter()
            .map(|extend| PendingExtend {
                container: id,
                extend,
            }),
    );
    Ok(())
}

fn add_enum(root: &mut Root, parent: EntityId, enum_file: EnumFile) -> Result<()> {
    let id = root.add_enum(parent, &enum_file.name)?;
    declare_options(root, id, &enum_file.options)?;
    for value in enum_file.values {
        root.add_enum_value(id, &value.name, value.number)?;
        for (path, token) in &value.options {
            root.declare_enum_value_option(id, &value.name, path, &token.0)?;
        }
    }
    Ok(())
}

fn declare_options(root: &mut Root, id: EntityId, options: &OptionsFile) -> Result<()> {
    for (path, token) in options {
        root.declare_option(id, path, &token.0)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proto_ir::EntityKind;

    const SAMPLE: &str = r#"
edition: 2023
package: example.v1
options:
  features.json_format: LEGACY_BEST_EFFORT
  java_package: com.example
messages:
  - name: Message
    fields:
      - name: id
        number: 1
        type: int32
        options:
          features.field_presence: IMPLICIT
    oneofs:
      - name: choice
        options:
          features.json_format: ALLOW
        fields:
          - name: text
            number: 2
            type: string
enums:
  - name: SomeEnum
    values:
      - name: ONE
        number: 1
        options:
          features.repeated_field_encoding: EXPANDED
extensions:
  - extendee: Message
    fields:
      - name: bar
        number: 16
        type: string
"#;

    #[test]
    fn test_load_yaml_manifest() {
        let root = ManifestLoader::default().load_from_yaml(SAMPLE).unwrap();

        assert_eq!(root.edition(), "2023");
        assert_eq!(
            root.root_entity().options().get_plain("java_package"),
            Some("com.example")
        );

        let message = root.lookup(".example.v1.Message").unwrap();
        assert_eq!(root.get(message).unwrap().kind(), EntityKind::Message);
        assert_eq!(root.fields(message).unwrap().len(), 2);

        let bar = root.lookup(".example.v1.Message.bar").unwrap();
        assert_eq!(root.get(bar).unwrap().kind(), EntityKind::Extension);
        assert_eq!(root.extension_fields(message).unwrap(), vec![bar]);

        let some_enum = root.lookup("example.v1.SomeEnum").unwrap();
        let one = root.get(some_enum).unwrap().enum_value("ONE").unwrap();
        assert_eq!(
            one.options().features().get_scalar("repeated_field_encoding"),
            Some("EXPANDED")
        );
    }

    #[test]
    fn test_forward_extendee_reference() {
        let json = r#"{
            "syntax": "proto2",
            "extensions": [{ "extendee": "Later", "fields": [{ "name": "x", "number": 100, "type": "int32" }] }],
            "messages": [{ "name": "Later" }]
        }"#;
        let root = ManifestLoader::default().load_from_json(json).unwrap();
        assert!(root.lookup(".Later.x").is_ok());
    }

    #[test]
    fn test_default_syntax_is_proto2() {
        let root = ManifestLoader::default().load_from_json("{}").unwrap();
        assert_eq!(root.edition(), "proto2");
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn test_edition_and_syntax_conflict() {
        let result = ManifestLoader::default().load_from_json(r#"{"edition": "2023", "syntax": "proto3"}"#);
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_invalid_manifest() {
        let result = ManifestLoader::default().load_from_yaml("messages: 7");
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_unknown_extendee() {
        let yaml = "extensions:\n  - extendee: Missing\n    fields:\n      - { name: x, number: 1, type: int32 }\n";
        let result = ManifestLoader::default().load_from_yaml(yaml);
        assert!(matches!(
            result,
            Err(Error::Tree(proto_ir::Error::LookupNotFound { .. }))
        ));
    }

    #[test]
    fn test_options_apply_in_declaration_order() {
        let yaml = r#"
edition: "2023"
messages:
  - name: Message
    options:
      features.(abc).d_e: nested
      features.(abc): flat
  - name: Other
    options:
      features.(abc): flat
      features.(abc).d_e: nested
"#;
        let root = ManifestLoader::default().load_from_yaml(yaml).unwrap();

        let message = root.lookup("Message").unwrap();
        let own = root.get(message).unwrap().options().features();
        assert_eq!(own.get_scalar("(abc)"), Some("flat"));

        let other = root.lookup("Other").unwrap();
        let own = root.get(other).unwrap().options().features();
        assert_eq!(
            own.get_path(&["(abc)", "d_e"]).and_then(|v| v.as_scalar()),
            Some("nested")
        );
    }

    #[test]
    fn test_option_tokens_keep_source_text() {
        let root = ManifestLoader::default()
            .load_from_yaml(
                "edition: 2023\noptions:\n  deprecated: true\n  features.(abc).limit: 10\n",
            )
            .unwrap();
        assert_eq!(root.edition(), "2023");
        assert_eq!(root.root_entity().options().get_plain("deprecated"), Some("true"));
        assert_eq!(
            root.root_entity()
                .options()
                .features()
                .get_path(&["(abc)", "limit"])
                .and_then(|v| v.as_scalar()),
            Some("10")
        );

        let quoted = ManifestLoader::default()
            .load_from_yaml("options:\n  features.(abc).ratio: \"1.50\"\n")
            .unwrap();
        assert_eq!(
            quoted
                .root_entity()
                .options()
                .features()
                .get_path(&["(abc)", "ratio"])
                .and_then(|v| v.as_scalar()),
            Some("1.50")
        );
    }

    #[test]
    fn test_unquoted_float_is_rejected() {
        let loader = ManifestLoader::default();
        assert!(matches!(
            loader.load_from_yaml("options:\n  features.(abc).ratio: 1.50\n"),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(
            loader.load_from_yaml("edition: 2023.0\n"),
            Err(Error::InvalidFormat(_))
        ));
        assert!(matches!(
            loader.load_from_json(r#"{"options": {"features.(abc).ratio": 1.5}}"#),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_load_not_found() {
        let loader = ManifestLoader::new(vec![PathBuf::from("does/not/exist")]);
        assert!(matches!(loader.load("missing"), Err(Error::NotFound(_))));
    }
}
