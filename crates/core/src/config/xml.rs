//! XML mapping for the configuration document.
//!
//! Layout: one `<configuration>` root, one element per section, one child
//! element per leaf whose text is the serialized value. `transport_modes`
//! nests one element per mode submap. Leaf types are inferred on load (see
//! [`ConfigValue::infer`]).

use std::collections::BTreeMap;
use std::fmt::Write as _;

use roxmltree::{Document, Node};
use tracing::warn;

use crate::error::{CoreError, CoreResult};

use super::value::{ConfigDocument, ConfigSection, ConfigValue};

const ROOT: &str = "configuration";

/// Parse a configuration document from XML text.
pub fn parse_document(text: &str) -> CoreResult<ConfigDocument> {
    let doc =
        Document::parse(text).map_err(|err| CoreError::ConfigParse(err.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != ROOT {
        return Err(CoreError::ConfigParse(format!(
            "expected <{ROOT}> root, found <{}>",
            root.tag_name().name()
        )));
    }

    let mut parsed = ConfigDocument {
        simulation: ConfigSection::new(),
        fuel_energy: ConfigSection::new(),
        fuel_carbon_content: ConfigSection::new(),
        fuel_prices: ConfigSection::new(),
        carbon_taxes: ConfigSection::new(),
        transport_modes: BTreeMap::new(),
    };

    for child in root.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "simulation" => parsed.simulation = parse_section(&child),
            "fuel_energy" => parsed.fuel_energy = parse_section(&child),
            "fuel_carbon_content" => parsed.fuel_carbon_content = parse_section(&child),
            "fuel_prices" => parsed.fuel_prices = parse_section(&child),
            "carbon_taxes" => parsed.carbon_taxes = parse_section(&child),
            "transport_modes" => {
                for mode in child.children().filter(Node::is_element) {
                    parsed
                        .transport_modes
                        .insert(mode.tag_name().name().to_string(), parse_section(&mode));
                }
            }
            other => warn!("ignoring unknown configuration section <{other}>"),
        }
    }

    Ok(parsed)
}

fn parse_section(node: &Node) -> ConfigSection {
    let mut section = ConfigSection::new();
    for leaf in node.children().filter(Node::is_element) {
        let text = leaf.text().unwrap_or("").trim();
        section.insert(
            leaf.tag_name().name().to_string(),
            ConfigValue::infer(text),
        );
    }
    section
}

/// Serialize a configuration document to XML text.
///
/// Output is deterministic: sections in declaration order, leaves in key
/// order, values formatted per their declared type.
pub fn write_document(doc: &ConfigDocument) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(out, "<{ROOT}>");
    write_section(&mut out, "simulation", &doc.simulation, 1);
    write_section(&mut out, "fuel_energy", &doc.fuel_energy, 1);
    write_section(&mut out, "fuel_carbon_content", &doc.fuel_carbon_content, 1);
    write_section(&mut out, "fuel_prices", &doc.fuel_prices, 1);
    write_section(&mut out, "carbon_taxes", &doc.carbon_taxes, 1);
    let _ = writeln!(out, "  <transport_modes>");
    for (mode, section) in &doc.transport_modes {
        write_section(&mut out, mode, section, 2);
    }
    let _ = writeln!(out, "  </transport_modes>");
    let _ = writeln!(out, "</{ROOT}>");
    out
}

fn write_section(out: &mut String, name: &str, section: &ConfigSection, depth: usize) {
    let pad = "  ".repeat(depth);
    let _ = writeln!(out, "{pad}<{name}>");
    for (key, value) in section {
        let _ = writeln!(
            out,
            "{pad}  <{key}>{}</{key}>",
            escape_text(&value.to_string())
        );
    }
    let _ = writeln!(out, "{pad}</{name}>");
}

fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_document_round_trips() {
        let doc = ConfigDocument::default();
        let text = write_document(&doc);
        let reparsed = parse_document(&text).expect("round-trip parse");
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        let err = parse_document("<configuration><simulation>").unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse(_)));
    }

    #[test]
    fn wrong_root_is_rejected() {
        let err = parse_document("<settings></settings>").unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse(_)));
    }

    #[test]
    fn leaf_types_are_inferred() {
        let text = "<configuration>\
            <simulation>\
              <time_step>15</time_step>\
              <time_value_of_money>45.000000</time_value_of_money>\
              <use_mode_specific>true</use_mode_specific>\
            </simulation>\
          </configuration>";
        let doc = parse_document(text).expect("parse");
        assert_eq!(doc.simulation["time_step"], ConfigValue::Int(15));
        assert_eq!(
            doc.simulation["time_value_of_money"],
            ConfigValue::Real(45.0)
        );
        assert_eq!(
            doc.simulation["use_mode_specific"],
            ConfigValue::Bool(true)
        );
    }

    #[test]
    fn string_values_are_escaped() {
        let mut doc = ConfigDocument::default();
        doc.simulation.insert(
            "note".to_string(),
            ConfigValue::Str("a < b & c".to_string()),
        );
        let text = write_document(&doc);
        assert!(text.contains("a &lt; b &amp; c"));
        let reparsed = parse_document(&text).expect("parse");
        assert_eq!(
            reparsed.simulation["note"],
            ConfigValue::Str("a < b & c".to_string())
        );
    }
}
