use super::PromptError;

/// Doubles every literal brace so the text survives [`render`] unchanged.
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// Substitutes `{name}` placeholders from `params`.
///
/// `{{` and `}}` render as single literal braces. Placeholder names are
/// ASCII identifiers; anything else between braces is an error rather
/// than being passed through.
pub fn render(frame: &str, params: &[(&str, &str)]) -> Result<String, PromptError> {
    let mut out = String::with_capacity(frame.len());
    let mut rest = frame.char_indices().peekable();

    while let Some((pos, c)) = rest.next() {
        match c {
            '{' => {
                if matches!(rest.peek(), Some((_, '{'))) {
                    rest.next();
                    out.push('{');
                    continue;
                }

                let mut name = String::new();
                let mut closed = false;
                for (_, nc) in rest.by_ref() {
                    if nc == '}' {
                        closed = true;
                        break;
                    }
                    name.push(nc);
                }
                if !closed {
                    return Err(PromptError::UnbalancedBrace {
                        brace: '{',
                        position: pos,
                    });
                }
                if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
                {
                    return Err(PromptError::InvalidPlaceholder {
                        name,
                        position: pos,
                    });
                }

                let value = params
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| *value)
                    .ok_or(PromptError::MissingParameter { name })?;
                out.push_str(value);
            }
            '}' => {
                if matches!(rest.peek(), Some((_, '}'))) {
                    rest.next();
                    out.push('}');
                } else {
                    return Err(PromptError::UnbalancedBrace {
                        brace: '}',
                        position: pos,
                    });
                }
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escaped_template_renders_verbatim() {
        let template = r#"Example: {"message": "DNS to evil.ru", "datetime": "{ts}"}"#;
        let rendered = render(&escape_braces(template), &[]).unwrap();
        assert_eq!(rendered, template);
    }

    #[test]
    fn test_substitutes_named_parameters() {
        let out = render("Room {room}: {n} msgs", &[("room", "room-7"), ("n", "2")]).unwrap();
        assert_eq!(out, "Room room-7: 2 msgs");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let out = render("{body}", &[("body", "{\"ip\": \"{dest}\"}")]).unwrap();
        assert_eq!(out, "{\"ip\": \"{dest}\"}");
    }

    #[test]
    fn test_missing_parameter() {
        assert_eq!(
            render("hello {who}", &[]),
            Err(PromptError::MissingParameter { name: "who".into() })
        );
    }

    #[test]
    fn test_unbalanced_braces() {
        assert!(matches!(
            render("oops {name", &[("name", "x")]),
            Err(PromptError::UnbalancedBrace { brace: '{', .. })
        ));
        assert!(matches!(
            render("oops }", &[]),
            Err(PromptError::UnbalancedBrace { brace: '}', position: 5 })
        ));
    }

    #[test]
    fn test_invalid_placeholder() {
        assert!(matches!(
            render("{\"a\": 1}", &[]),
            Err(PromptError::InvalidPlaceholder { .. })
        ));
        assert!(matches!(
            render("{}", &[]),
            Err(PromptError::InvalidPlaceholder { .. })
        ));
    }

    #[test]
    fn test_multibyte_text_around_placeholders() {
        let out = render("Ümlaut {x} → done", &[("x", "ß")]).unwrap();
        assert_eq!(out, "Ümlaut ß → done");
    }
}
