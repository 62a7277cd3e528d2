// Path templates in the `{name:03d}` style used by dataset info files

/// Substitutes `{key}` and `{key:0Nd}` placeholders. Unknown keys are left
/// untouched so a bad template shows up verbatim in the fetch error.
pub fn render_template(template: &str, vars: &[(&str, TemplateValue<'_>)]) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let placeholder = &after[..close];
        let (key, spec) = match placeholder.split_once(':') {
            Some((key, spec)) => (key, Some(spec)),
            None => (placeholder, None),
        };

        match vars.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => out.push_str(&value.render(spec)),
            None => {
                out.push('{');
                out.push_str(placeholder);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

#[derive(Debug, Clone, Copy)]
pub enum TemplateValue<'a> {
    Int(u64),
    Text(&'a str),
}

impl TemplateValue<'_> {
    fn render(&self, spec: Option<&str>) -> String {
        match self {
            TemplateValue::Text(text) => text.to_string(),
            TemplateValue::Int(value) => {
                let width = spec
                    .map(|s| s.trim_end_matches('d').trim_start_matches('0'))
                    .and_then(|w| w.parse::<usize>().ok())
                    .unwrap_or(0);
                format!("{:0width$}", value, width = width)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::{CHUNKED_VIDEO_TEMPLATE, LEGACY_DATA_TEMPLATE};

    #[test]
    fn test_legacy_data_path() {
        let path = render_template(
            LEGACY_DATA_TEMPLATE,
            &[
                ("episode_chunk", TemplateValue::Int(1)),
                ("episode_index", TemplateValue::Int(1042)),
            ],
        );
        assert_eq!(path, "data/chunk-001/episode_001042.parquet");
    }

    #[test]
    fn test_chunked_video_path() {
        let path = render_template(
            CHUNKED_VIDEO_TEMPLATE,
            &[
                ("video_key", TemplateValue::Text("observation.images.top")),
                ("chunk_index", TemplateValue::Int(0)),
                ("file_index", TemplateValue::Int(12)),
            ],
        );
        assert_eq!(path, "videos/observation.images.top/chunk-000/file-012.mp4");
    }

    #[test]
    fn test_unknown_placeholder_is_kept() {
        assert_eq!(
            render_template("a/{missing}/{x}", &[("x", TemplateValue::Int(5))]),
            "a/{missing}/5"
        );
        assert_eq!(render_template("open{brace", &[]), "open{brace");
    }
}
