//! Line-level reading and rewriting of `.tscn` scene text.
//!
//! Only two line shapes matter:
//!
//! ```text
//! [node name="Tree_Birch_01" type="MeshInstance3D" parent="Vegetation"]
//! transform = Transform3D(1, 0, 0, 0, 1, 0, 0, 0, 1, 12.5, 30, -4)
//! ```
//!
//! The transform carries a 3x3 basis followed by the origin; the origin's
//! second component is the height. Everything else passes through untouched.

use std::ops::Range;

use super::contains_keyword;
use crate::error::{Result, SnapError};

/// Number of numeric fields in a transform: 3x3 basis + origin.
pub const TRANSFORM_FIELDS: usize = 12;
const HEIGHT_FIELD: usize = 10;

/// Attributes of a `[node ...]` section header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHeader {
    pub name: String,
    pub node_type: Option<String>,
    pub parent: Option<String>,
}

impl NodeHeader {
    /// Whether the node's transform is stored relative to a gameplay
    /// container rather than in world space.
    pub fn has_relative_parent(&self, markers: &[String]) -> bool {
        self.parent
            .as_deref()
            .is_some_and(|p| contains_keyword(p, markers))
    }

    pub fn is_terrain(&self, markers: &[String]) -> bool {
        contains_keyword(&self.name, markers)
    }
}

/// A parsed transform line.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformLine {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Byte range of the height field's text within the line.
    pub height_span: Range<usize>,
}

/// One object instance found while scanning.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// 1-based line number of the transform.
    pub line: usize,
    pub name: String,
    pub node_type: Option<String>,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Placement {
    pub fn new(line: usize, header: &NodeHeader, transform: &TransformLine) -> Self {
        Self {
            line,
            name: header.name.clone(),
            node_type: header.node_type.clone(),
            x: transform.x,
            y: transform.y,
            z: transform.z,
        }
    }
}

/// `[anything]`, ignoring surrounding whitespace.
pub fn is_section_header(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('[') && trimmed.ends_with(']')
}

/// Parse a `[node ...]` header. `Ok(None)` for any other line; a node
/// header without a name is a parse error.
pub fn parse_node_header(line: &str, line_no: usize) -> Result<Option<NodeHeader>> {
    let trimmed = line.trim();
    if !is_section_header(trimmed) || !trimmed.starts_with("[node ") {
        return Ok(None);
    }

    let name = attribute(trimmed, "name").ok_or_else(|| SnapError::Parse {
        line: line_no,
        message: "node header has no name".to_string(),
    })?;

    Ok(Some(NodeHeader {
        name: name.to_string(),
        node_type: attribute(trimmed, "type").map(str::to_string),
        parent: attribute(trimmed, "parent").map(str::to_string),
    }))
}

/// Value of `key="..."` inside a header. The key must start a word so that
/// `parent` does not match inside `instance_parent`.
fn attribute<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("{}=\"", key);
    let mut from = 0;
    while let Some(found) = header[from..].find(&pattern) {
        let start = from + found;
        let value_start = start + pattern.len();
        let at_word_start = header[..start]
            .chars()
            .next_back()
            .map_or(true, |c| c.is_whitespace() || c == '[');
        if at_word_start {
            let len = header[value_start..].find('"')?;
            return Some(&header[value_start..value_start + len]);
        }
        from = value_start;
    }
    None
}

/// Parse a `transform = Transform3D(...)` line. `Ok(None)` for any other
/// line; a transform with the wrong field count or a non-numeric field is a
/// parse error.
pub fn parse_transform(line: &str, line_no: usize) -> Result<Option<TransformLine>> {
    let Some((key, value)) = line.split_once('=') else {
        return Ok(None);
    };
    if key.trim() != "transform" {
        return Ok(None);
    }

    let parse_err = |message: String| SnapError::Parse {
        line: line_no,
        message,
    };

    let value = value.trim_start();
    if !(value.starts_with("Transform3D(") || value.starts_with("Transform(")) {
        return Err(parse_err(format!("unsupported transform value: {}", value.trim_end())));
    }

    let open = line
        .find('(')
        .ok_or_else(|| parse_err("missing '('".to_string()))?;
    let close = line
        .rfind(')')
        .filter(|&c| c > open)
        .ok_or_else(|| parse_err("missing ')'".to_string()))?;

    let mut values = [0.0f32; TRANSFORM_FIELDS];
    let mut height_span = 0..0;
    let mut count = 0;
    let mut field_start = open + 1;

    for raw in line[open + 1..close].split(',') {
        let leading = raw.len() - raw.trim_start().len();
        let text = raw.trim();
        let span = field_start + leading..field_start + leading + text.len();
        field_start += raw.len() + 1;

        if count >= TRANSFORM_FIELDS {
            count += 1;
            continue;
        }
        values[count] = text
            .parse::<f32>()
            .map_err(|_| parse_err(format!("field {} is not a number: {:?}", count + 1, text)))?;
        if count == HEIGHT_FIELD {
            height_span = span;
        }
        count += 1;
    }

    if count != TRANSFORM_FIELDS {
        return Err(parse_err(format!(
            "expected {} transform fields, found {}",
            TRANSFORM_FIELDS, count
        )));
    }

    Ok(Some(TransformLine {
        x: values[9],
        y: values[10],
        z: values[11],
        height_span,
    }))
}

/// Height as written back into a scene: four decimals, no trailing zeros.
pub fn format_height(value: f32) -> String {
    let text = format!("{:.4}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

/// Copy of `line` with only the height field replaced.
pub fn replace_height(line: &str, transform: &TransformLine, height: f32) -> String {
    let span = &transform.height_span;
    let mut out = String::with_capacity(line.len() + 8);
    out.push_str(&line[..span.start]);
    out.push_str(&format_height(height));
    out.push_str(&line[span.end..]);
    out
}

/// Split text into `(content, terminator)` pairs, keeping `\n` or `\r\n`
/// so output can be reassembled byte for byte.
pub fn split_lines(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.split_inclusive('\n').map(|chunk| {
        if let Some(body) = chunk.strip_suffix("\r\n") {
            (body, "\r\n")
        } else if let Some(body) = chunk.strip_suffix('\n') {
            (body, "\n")
        } else {
            (chunk, "")
        }
    })
}
