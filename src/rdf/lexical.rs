//! Lexical forms of RDF terms
//!
//! Character classes shared by the Turtle and SPARQL grammars, escape
//! handling, IRI reference resolution and the textual term format accepted
//! by [`parse_term`].

use super::types::{
    BlankNode, Literal, NamedNode, RdfObject, RdfPredicate, RdfSubject, RdfTerm, TermError,
    TermResult,
};
use oxiri::Iri;
use std::borrow::Cow;

pub(crate) fn is_pn_chars_base(c: char) -> bool {
    matches!(c,
        'A'..='Z' | 'a'..='z'
        | '\u{00C0}'..='\u{00D6}' | '\u{00D8}'..='\u{00F6}' | '\u{00F8}'..='\u{02FF}'
        | '\u{0370}'..='\u{037D}' | '\u{037F}'..='\u{1FFF}' | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}' | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' | '\u{10000}'..='\u{EFFFF}')
}

pub(crate) fn is_pn_chars_u(c: char) -> bool {
    c == '_' || is_pn_chars_base(c)
}

pub(crate) fn is_pn_chars(c: char) -> bool {
    is_pn_chars_u(c)
        || c == '-'
        || c.is_ascii_digit()
        || c == '\u{00B7}'
        || ('\u{0300}'..='\u{036F}').contains(&c)
        || ('\u{203F}'..='\u{2040}').contains(&c)
}

/// Check a label against the Turtle `BLANK_NODE_LABEL` production (without `_:`)
pub fn validate_blank_node_label(label: &str) -> TermResult<()> {
    let invalid = || TermError::InvalidBlankNodeLabel(label.to_string());
    let mut chars = label.chars();
    match chars.next() {
        Some(c) if is_pn_chars_u(c) || c.is_ascii_digit() => {}
        _ => return Err(invalid()),
    }
    if label.ends_with('.') {
        return Err(invalid());
    }
    if chars.all(|c| is_pn_chars(c) || c == '.') {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// Reject characters that may not appear inside `<...>`
pub fn validate_iri(iri: &str) -> TermResult<()> {
    let forbidden = |c: char| {
        c <= ' ' || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\')
    };
    if iri.chars().any(forbidden) {
        Err(TermError::InvalidIri(iri.to_string()))
    } else {
        Ok(())
    }
}

fn scheme_len(text: &str) -> Option<usize> {
    let colon = text.find(':')?;
    let scheme = &text[..colon];
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return None,
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some(colon)
    } else {
        None
    }
}

/// `scheme ":" ...`
pub fn is_absolute_iri(text: &str) -> bool {
    scheme_len(text).is_some()
}

/// Check a BCP47-shaped language tag: `[a-zA-Z]+ ("-" [a-zA-Z0-9]+)*`
pub fn validate_language_tag(tag: &str) -> TermResult<()> {
    let mut parts = tag.split('-');
    let primary_ok = parts
        .next()
        .is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphabetic()));
    let rest_ok = parts.all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric()));
    if primary_ok && rest_ok {
        Ok(())
    } else {
        Err(TermError::InvalidLanguageTag(tag.to_string()))
    }
}

fn hex_char(digits: &str, original: &str) -> TermResult<char> {
    let invalid = || TermError::InvalidLiteralEscape(original.to_string());
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let code = u32::from_str_radix(digits, 16).map_err(|_| invalid())?;
    // from_u32 rejects surrogates
    char::from_u32(code).ok_or_else(invalid)
}

fn unescape_with(text: &str, allow_echar: bool) -> TermResult<Cow<'_, str>> {
    if !text.contains('\\') {
        return Ok(Cow::Borrowed(text));
    }
    let invalid = || TermError::InvalidLiteralEscape(text.to_string());
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let mut chars = after.chars();
        let escape = chars.next().ok_or_else(invalid)?;
        let consumed = match escape {
            'u' | 'U' => {
                let width = if escape == 'u' { 4 } else { 8 };
                let digits = after.get(1..1 + width).ok_or_else(invalid)?;
                out.push(hex_char(digits, text)?);
                1 + width
            }
            't' | 'b' | 'n' | 'r' | 'f' | '"' | '\'' | '\\' if allow_echar => {
                out.push(match escape {
                    't' => '\t',
                    'b' => '\u{08}',
                    'n' => '\n',
                    'r' => '\r',
                    'f' => '\u{0C}',
                    other => other,
                });
                1
            }
            _ => return Err(invalid()),
        };
        rest = &after[consumed..];
    }
    out.push_str(rest);
    Ok(Cow::Owned(out))
}

/// Decode `ECHAR` and `UCHAR` escapes of a string literal
pub fn unescape(text: &str) -> TermResult<Cow<'_, str>> {
    unescape_with(text, true)
}

/// Decode `UCHAR` escapes of an `IRIREF`
pub fn unescape_iri(text: &str) -> TermResult<Cow<'_, str>> {
    unescape_with(text, false).map_err(|_| TermError::InvalidIri(text.to_string()))
}

/// Escape a lexical form for a double-quoted literal
pub fn escape_literal(value: &str) -> Cow<'_, str> {
    let needs_escape = |c: char| matches!(c, '"' | '\\' | '\n' | '\r' | '\t') || c.is_control();
    if !value.chars().any(needs_escape) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Parse the textual form of a single term
///
/// - `_:label` is a blank node
/// - `<iri>` or `scheme:rest` (no whitespace in `rest`) is an IRI
/// - `"..."`, `"..."@lang` and `"..."^^<datatype>` are N-Triples literals
/// - anything else is the lexical form of a simple literal
///
/// Escapes are decoded for both literal forms.
pub fn parse_term(text: &str) -> TermResult<RdfTerm> {
    if let Some(label) = text.strip_prefix("_:") {
        return Ok(BlankNode::new(label)?.into());
    }
    if let Some(inner) = text.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        let iri = unescape_iri(inner)?;
        return Ok(NamedNode::new(&iri)?.into());
    }
    if let Some(colon) = scheme_len(text) {
        if !text[colon + 1..].chars().any(char::is_whitespace) {
            return Ok(NamedNode::new(text)?.into());
        }
    }
    if text.starts_with('"') {
        return parse_quoted_literal(text).map(RdfTerm::from);
    }
    Ok(Literal::new_simple_literal(unescape(text)?.as_ref()).into())
}

fn parse_quoted_literal(text: &str) -> TermResult<Literal> {
    let malformed = || TermError::MalformedLiteral(text.to_string());
    let body = &text[1..];
    let mut escaped = false;
    let mut close = None;
    for (i, c) in body.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => {
                close = Some(i);
                break;
            }
            _ => {}
        }
    }
    let close = close.ok_or_else(malformed)?;
    let lexical = unescape(&body[..close])?;
    let suffix = &body[close + 1..];

    if suffix.is_empty() {
        Ok(Literal::new_simple_literal(lexical.as_ref()))
    } else if let Some(lang) = suffix.strip_prefix('@') {
        Literal::new_language_tagged_literal(lexical.as_ref(), lang)
    } else if let Some(datatype) = suffix.strip_prefix("^^") {
        let inner = datatype
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .ok_or_else(malformed)?;
        let iri = unescape_iri(inner)?;
        Literal::try_typed_literal(lexical.as_ref(), NamedNode::new(&iri)?)
    } else {
        Err(malformed())
    }
}

/// Parse a term that must be usable as a subject
pub fn parse_subject(text: &str) -> TermResult<RdfSubject> {
    parse_term(text)?.try_into()
}

/// Parse a term that must be usable as a predicate
pub fn parse_predicate(text: &str) -> TermResult<RdfPredicate> {
    parse_term(text)?.try_into()
}

/// Parse a term in object position (any term)
pub fn parse_object(text: &str) -> TermResult<RdfObject> {
    parse_term(text).map(RdfObject::from)
}

/// Resolve an IRI reference against an absolute base IRI (RFC 3986 section 5.2)
pub fn resolve_iri(base: &str, reference: &str) -> TermResult<String> {
    validate_iri(reference)?;
    let base = Iri::parse(base).map_err(|e| TermError::InvalidIri(format!("{}: {}", base, e)))?;
    base.resolve(reference)
        .map(Iri::into_inner)
        .map_err(|e| TermError::InvalidIri(format!("{}: {}", reference, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::types::vocab;

    #[test]
    fn test_parse_term_blank_node() {
        assert_eq!(
            parse_term("_:b1").unwrap(),
            RdfTerm::BlankNode(BlankNode::new("b1").unwrap())
        );
        assert!(matches!(
            parse_term("_:"),
            Err(TermError::InvalidBlankNodeLabel(_))
        ));
        assert!(matches!(
            parse_term("_:a b"),
            Err(TermError::InvalidBlankNodeLabel(_))
        ));
    }

    #[test]
    fn test_parse_term_iri() {
        let term = parse_term("http://example.org/alice").unwrap();
        assert_eq!(term, NamedNode::new("http://example.org/alice").unwrap().into());

        let term = parse_term("<urn:isbn:0451450523>").unwrap();
        assert!(term.is_named_node());

        assert!(matches!(
            parse_term("http://example.org/{bad}"),
            Err(TermError::InvalidIri(_))
        ));
        assert!(matches!(parse_term("<relative>"), Err(TermError::InvalidIri(_))));
    }

    #[test]
    fn test_parse_term_bare_text_is_literal() {
        assert_eq!(
            parse_term("Alice").unwrap(),
            Literal::new_simple_literal("Alice").into()
        );
        // whitespace after the colon is not an IRI
        assert_eq!(
            parse_term("note: hello").unwrap(),
            Literal::new_simple_literal("note: hello").into()
        );
        // scheme must start with a letter
        assert!(parse_term("12:30").unwrap().is_literal());
        assert_eq!(
            parse_term("tab\\there").unwrap(),
            Literal::new_simple_literal("tab\there").into()
        );
        assert!(matches!(
            parse_term("bad\\qescape"),
            Err(TermError::InvalidLiteralEscape(_))
        ));
    }

    #[test]
    fn test_parse_term_quoted_literals() {
        assert_eq!(
            parse_term("\"hello\"").unwrap(),
            Literal::new_simple_literal("hello").into()
        );
        let lang = parse_term("\"hola\"@ES").unwrap();
        assert_eq!(lang.as_literal().unwrap().language(), Some("es"));

        let typed = parse_term("\"5\"^^<http://www.w3.org/2001/XMLSchema#integer>").unwrap();
        assert_eq!(typed.as_literal().unwrap().datatype_iri(), vocab::XSD_INTEGER);

        let quoted = parse_term("\"say \\\"hi\\\"\"").unwrap();
        assert_eq!(quoted.as_literal().unwrap().value(), "say \"hi\"");

        assert!(matches!(
            parse_term("\"unterminated"),
            Err(TermError::MalformedLiteral(_))
        ));
        assert!(matches!(
            parse_term("\"x\"garbage"),
            Err(TermError::MalformedLiteral(_))
        ));
    }

    #[test]
    fn test_lang_string_datatype_needs_tag() {
        assert!(matches!(
            parse_term("\"x\"^^<http://www.w3.org/1999/02/22-rdf-syntax-ns#langString>"),
            Err(TermError::InvalidDatatype(_))
        ));
    }

    #[test]
    fn test_unescape_rejects_surrogates() {
        assert_eq!(unescape("\\u00E9").unwrap(), "é");
        assert_eq!(unescape("\\U0001F600").unwrap(), "😀");
        assert!(unescape("\\uD800").is_err());
        assert!(unescape("\\u12").is_err());
        assert!(unescape("trailing\\").is_err());
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("plain"), "plain");
        assert_eq!(escape_literal("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
        assert_eq!(escape_literal("\u{7}"), "\\u0007");
    }

    #[test]
    fn test_positional_parsers() {
        assert!(parse_subject("_:x").is_ok());
        assert!(matches!(
            parse_subject("Alice"),
            Err(TermError::InvalidPosition { .. })
        ));
        assert!(matches!(
            parse_predicate("_:x"),
            Err(TermError::InvalidPosition { .. })
        ));
        assert!(parse_object("Alice").unwrap().is_literal());
    }

    #[test]
    fn test_language_tags() {
        assert!(validate_language_tag("en").is_ok());
        assert!(validate_language_tag("en-US").is_ok());
        assert!(validate_language_tag("zh-Hant-TW").is_ok());
        assert!(validate_language_tag("").is_err());
        assert!(validate_language_tag("en-").is_err());
        assert!(validate_language_tag("e1").is_err());
    }

    #[test]
    fn test_resolve_iri_rfc3986_examples() {
        let base = "http://a/b/c/d;p?q";
        let cases = [
            ("g:h", "g:h"),
            ("g", "http://a/b/c/g"),
            ("./g", "http://a/b/c/g"),
            ("g/", "http://a/b/c/g/"),
            ("/g", "http://a/g"),
            ("//g", "http://g"),
            ("?y", "http://a/b/c/d;p?y"),
            ("g?y", "http://a/b/c/g?y"),
            ("#s", "http://a/b/c/d;p?q#s"),
            ("g#s", "http://a/b/c/g#s"),
            ("", "http://a/b/c/d;p?q"),
            (".", "http://a/b/c/"),
            ("./", "http://a/b/c/"),
            ("..", "http://a/b/"),
            ("../g", "http://a/b/g"),
            ("../..", "http://a/"),
            ("../../g", "http://a/g"),
            ("../../../g", "http://a/g"),
            ("/./g", "http://a/g"),
            ("g.", "http://a/b/c/g."),
            ("./../g", "http://a/b/g"),
            ("g;x=1/../y", "http://a/b/c/y"),
        ];
        for (reference, expected) in cases {
            assert_eq!(resolve_iri(base, reference).unwrap(), expected, "ref {reference}");
        }
    }

    #[test]
    fn test_resolve_iri_requires_absolute_base() {
        assert!(resolve_iri("relative/base", "x").is_err());
        assert!(resolve_iri("http://example.org/", "a b").is_err());
    }
}
