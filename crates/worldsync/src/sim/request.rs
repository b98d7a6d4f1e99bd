use std::fmt::Write as _;

/// Wire value of `Entity.type` for a model.
pub const ENTITY_TYPE_MODEL: i64 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    /// Emitted verbatim after the key.
    Raw(String),
    Message(TextMessage),
}

/// Ordered key/value fields rendered in protobuf text syntax. Top-level
/// fields are separated by `", "`, nested ones by a single space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextMessage {
    fields: Vec<(String, FieldValue)>,
}

impl TextMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn str(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.push((key.to_string(), FieldValue::Str(value.into())));
        self
    }

    pub fn int(mut self, key: &str, value: i64) -> Self {
        self.fields.push((key.to_string(), FieldValue::Int(value)));
        self
    }

    pub fn raw(mut self, key: &str, token: impl Into<String>) -> Self {
        self.fields.push((key.to_string(), FieldValue::Raw(token.into())));
        self
    }

    pub fn message(mut self, key: &str, value: TextMessage) -> Self {
        self.fields.push((key.to_string(), FieldValue::Message(value)));
        self
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, ", ");
        out
    }

    fn render_into(&self, out: &mut String, separator: &str) {
        for (idx, (key, value)) in self.fields.iter().enumerate() {
            if idx > 0 {
                out.push_str(separator);
            }
            match value {
                FieldValue::Str(text) => {
                    let _ = write!(out, "{key}: \"{}\"", escape_str(text));
                }
                FieldValue::Int(number) => {
                    let _ = write!(out, "{key}: {number}");
                }
                FieldValue::Raw(token) => {
                    let _ = write!(out, "{key}: {token}");
                }
                FieldValue::Message(nested) => {
                    out.push_str(key);
                    out.push_str(" { ");
                    nested.render_into(out, " ");
                    out.push_str(" }");
                }
            }
        }
    }
}

pub fn escape_str(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Collapses every whitespace run to one space.
pub fn compact_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `EntityFactory` request carrying a whole `<sdf>` document.
pub fn create_request(sdf_document: &str) -> TextMessage {
    TextMessage::new().str("sdf", compact_whitespace(sdf_document))
}

pub fn remove_request(model_name: &str) -> TextMessage {
    TextMessage::new()
        .str("name", model_name)
        .int("type", ENTITY_TYPE_MODEL)
}

/// `Pose` request as a printf-style format with one `%r` slot per
/// coordinate. A `%` in the name is doubled.
pub fn set_pose_format(model_name: &str) -> String {
    TextMessage::new()
        .str("name", model_name.replace('%', "%%"))
        .message(
            "position",
            TextMessage::new()
                .raw("x", "%r")
                .raw("y", "%r")
                .raw("z", "%r"),
        )
        .message("orientation", TextMessage::new().int("w", 1))
        .render()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_request_matches_entity_message_syntax() {
        assert_eq!(remove_request("wall_1").render(), r#"name: "wall_1", type: 2"#);
    }

    #[test]
    fn set_pose_format_nests_with_spaces() {
        assert_eq!(
            set_pose_format("box_1"),
            r#"name: "box_1", position { x: %r y: %r z: %r }, orientation { w: 1 }"#
        );
        assert_eq!(
            set_pose_format("50%\"off\""),
            r#"name: "50%%\"off\"", position { x: %r y: %r z: %r }, orientation { w: 1 }"#
        );
    }

    #[test]
    fn create_request_compacts_then_escapes_quotes() {
        let sdf = "<sdf version=\"1.8\">\n  <model name=\"a\">\n  </model>\n</sdf>";
        assert_eq!(
            create_request(sdf).render(),
            r#"sdf: "<sdf version=\"1.8\"> <model name=\"a\"> </model> </sdf>""#
        );
    }

    #[test]
    fn escaping_handles_backslashes_before_quotes() {
        assert_eq!(escape_str(r#"a\"b"#), r#"a\\\"b"#);
        assert_eq!(escape_str("line\nbreak"), "line\\nbreak");
    }
}
