//! XML parsing to XBIS events.
//!
//! Uses quick-xml to turn XML text into the event sequence the writer
//! consumes. Namespace declarations (`xmlns`, `xmlns:p`) are lifted out of
//! the attribute lists into mapping events, and prefixes are resolved
//! against a scope stack maintained here — der Codec selbst arbeitet nur mit
//! (Prefix, URI)-Paaren.

use std::io::BufRead;
use std::rc::Rc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::event::XbisEvent;
use crate::qname::XML_NAMESPACE;
use crate::writer::{encode_with_config, WriterConfig};
use crate::{Error, Result};

/// Parse XML text into XBIS events.
pub fn parse_xml_events(xml: &str) -> Result<Vec<XbisEvent>> {
    parse_xml_events_from_reader(xml.as_bytes())
}

/// Parse XML from a buffered reader into XBIS events.
pub fn parse_xml_events_from_reader<B: BufRead>(input: B) -> Result<Vec<XbisEvent>> {
    let mut events = Vec::new();
    emit_xml_events(input, |e| {
        events.push(e);
        Ok(())
    })?;
    Ok(events)
}

/// Encode XML text straight to XBIS bytes with default configuration.
pub fn encode_xml_str(xml: &str) -> Result<Vec<u8>> {
    encode_xml_reader(xml.as_bytes())
}

/// Encode XML from a buffered reader to XBIS bytes.
///
/// Die Eingabe wird vollständig in Events geparst (Batch-API).
pub fn encode_xml_reader<B: BufRead>(input: B) -> Result<Vec<u8>> {
    encode_xml_reader_with_config(input, WriterConfig::default())
}

/// Encode XML from a buffered reader to XBIS bytes with configuration.
pub fn encode_xml_reader_with_config<B: BufRead>(
    input: B,
    config: WriterConfig,
) -> Result<Vec<u8>> {
    let events = parse_xml_events_from_reader(input)?;
    encode_with_config(&events, config)
}

/// One in-scope prefix binding, tagged with the depth that declared it.
struct Scope {
    depth: usize,
    prefix: Rc<str>,
    uri: Rc<str>,
}

/// Parses XML and calls `emit` for each event (callback-based).
fn emit_xml_events<B: BufRead>(
    input: B,
    mut emit: impl FnMut(XbisEvent) -> Result<()>,
) -> Result<()> {
    let mut reader = Reader::from_reader(input);
    let mut buf = Vec::new();
    let mut scopes: Vec<Scope> = Vec::new();
    let mut depth = 0usize;

    emit(XbisEvent::StartDocument)?;
    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(Error::XmlParse(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                depth += 1;
                emit_start(&e, &mut scopes, depth, &mut emit)?;
            }
            Ok(Event::Empty(e)) => {
                depth += 1;
                emit_start(&e, &mut scopes, depth, &mut emit)?;
                emit(XbisEvent::EndElement)?;
                scopes.retain(|s| s.depth != depth);
                depth -= 1;
            }
            Ok(Event::End(_)) => {
                emit(XbisEvent::EndElement)?;
                scopes.retain(|s| s.depth != depth);
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| Error::XmlParse(e.to_string()))?;
                if !text.is_empty() {
                    emit(XbisEvent::Text(Rc::from(&*text)))?;
                }
            }
            Ok(Event::CData(c)) => {
                let text = std::str::from_utf8(&c).map_err(|_| Error::InvalidUtf8)?;
                emit(XbisEvent::Cdata(Rc::from(text)))?;
            }
            Ok(Event::Comment(t)) => {
                let text = t.unescape().map_err(|e| Error::XmlParse(e.to_string()))?;
                emit(XbisEvent::Comment(Rc::from(&*text)))?;
            }
            Ok(Event::PI(pi)) => {
                let target =
                    std::str::from_utf8(pi.target()).map_err(|_| Error::InvalidUtf8)?;
                let data =
                    std::str::from_utf8(pi.content()).map_err(|_| Error::InvalidUtf8)?;
                emit(XbisEvent::ProcessingInstruction {
                    target: Rc::from(target),
                    data: Rc::from(data.trim_start()),
                })?;
            }
            Ok(Event::DocType(t)) => {
                let raw = t.unescape().map_err(|e| Error::XmlParse(e.to_string()))?;
                emit(parse_doctype(raw.trim()))?;
            }
            Ok(Event::Decl(_)) => {}
            Ok(_) => {
                // Entity-Referenzen u.ä. haben keine XBIS-Entsprechung.
                log::warn!("skipping XML construct without an XBIS event mapping");
            }
        }
        buf.clear();
    }
    emit(XbisEvent::EndDocument)?;
    Ok(())
}

/// Splits off namespace declarations, resolves prefixes, and emits
/// mapping events followed by the element start and its attributes.
fn emit_start(
    e: &BytesStart<'_>,
    scopes: &mut Vec<Scope>,
    depth: usize,
    emit: &mut impl FnMut(XbisEvent) -> Result<()>,
) -> Result<()> {
    // xmlns-Attribute zuerst: sie gelten schon für den Elementnamen selbst.
    let mut plain: Vec<(Rc<str>, Rc<str>)> = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::XmlParse(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(|_| Error::InvalidUtf8)?;
        let attr_value = attr.unescape_value().map_err(|e| Error::XmlParse(e.to_string()))?;
        if key == "xmlns" {
            let uri: Rc<str> = Rc::from(&*attr_value);
            scopes.push(Scope { depth, prefix: Rc::from(""), uri: Rc::clone(&uri) });
            emit(XbisEvent::NamespaceDeclaration { prefix: Rc::from(""), uri })?;
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            let uri: Rc<str> = Rc::from(&*attr_value);
            scopes.push(Scope { depth, prefix: Rc::from(prefix), uri: Rc::clone(&uri) });
            emit(XbisEvent::NamespaceDeclaration { prefix: Rc::from(prefix), uri })?;
        } else {
            plain.push((Rc::from(key), Rc::from(&*attr_value)));
        }
    }

    let name_raw = e.name();
    let name = std::str::from_utf8(name_raw.as_ref()).map_err(|_| Error::InvalidUtf8)?;
    let (prefix, local) = split_prefix(name);
    let uri = resolve_prefix(scopes, prefix, true)?;
    emit(XbisEvent::StartElement {
        prefix: Rc::from(prefix),
        uri,
        local: Rc::from(local),
    })?;

    for (key, attr_value) in plain {
        let (prefix, local) = split_prefix(&key);
        // Unprefixed Attribute liegen im leeren Namespace, nicht im Default.
        let uri = if prefix.is_empty() { Rc::from("") } else { resolve_prefix(scopes, prefix, false)? };
        emit(XbisEvent::Attribute {
            prefix: Rc::from(prefix),
            uri,
            local: Rc::from(local),
            value: attr_value,
        })?;
    }
    Ok(())
}

fn split_prefix(name: &str) -> (&str, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (prefix, local),
        None => ("", name),
    }
}

/// Resolves a prefix against the scope stack (innermost binding wins).
/// `use_default` selects whether the empty prefix picks up the default
/// namespace (elements yes, attributes no).
fn resolve_prefix(scopes: &[Scope], prefix: &str, use_default: bool) -> Result<Rc<str>> {
    if prefix == "xml" {
        return Ok(Rc::from(XML_NAMESPACE));
    }
    if prefix.is_empty() && !use_default {
        return Ok(Rc::from(""));
    }
    for scope in scopes.iter().rev() {
        if &*scope.prefix == prefix {
            return Ok(Rc::clone(&scope.uri));
        }
    }
    if prefix.is_empty() {
        return Ok(Rc::from(""));
    }
    Err(Error::XmlParse(format!("unbound namespace prefix '{prefix}'")))
}

/// Minimal DOCTYPE parse: name plus optional PUBLIC/SYSTEM identifiers.
fn parse_doctype(raw: &str) -> XbisEvent {
    let mut rest = raw;
    let name = take_token(&mut rest);
    let keyword = take_token(&mut rest);
    let (public_id, system_id) = match keyword.as_str() {
        "PUBLIC" => {
            let public = take_quoted(&mut rest);
            let system = take_quoted(&mut rest);
            (public, system)
        }
        "SYSTEM" => (String::new(), take_quoted(&mut rest)),
        _ => (String::new(), String::new()),
    };
    XbisEvent::DocType {
        name: Rc::from(name.as_str()),
        public_id: Rc::from(public_id.as_str()),
        system_id: Rc::from(system_id.as_str()),
    }
}

fn take_token(rest: &mut &str) -> String {
    let trimmed = rest.trim_start();
    let end = trimmed
        .find(|c: char| c.is_whitespace() || c == '[')
        .unwrap_or(trimmed.len());
    let token = &trimmed[..end];
    *rest = &trimmed[end..];
    token.to_string()
}

fn take_quoted(rest: &mut &str) -> String {
    let trimmed = rest.trim_start();
    let Some(quote) = trimmed.chars().next().filter(|&c| c == '"' || c == '\'') else {
        *rest = trimmed;
        return String::new();
    };
    let body = &trimmed[1..];
    match body.find(quote) {
        Some(end) => {
            *rest = &body[end + 1..];
            body[..end].to_string()
        }
        None => {
            *rest = "";
            body.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_document() {
        let events = parse_xml_events("<doc><item>text</item></doc>").unwrap();
        assert_eq!(
            events,
            vec![
                XbisEvent::StartDocument,
                XbisEvent::start_local("doc"),
                XbisEvent::start_local("item"),
                XbisEvent::Text(Rc::from("text")),
                XbisEvent::EndElement,
                XbisEvent::EndElement,
                XbisEvent::EndDocument,
            ]
        );
    }

    #[test]
    fn lifts_namespace_declarations() {
        let events =
            parse_xml_events(r#"<p:e xmlns:p="urn:x"><p:c/></p:e>"#).unwrap();
        assert_eq!(
            events,
            vec![
                XbisEvent::StartDocument,
                XbisEvent::NamespaceDeclaration { prefix: Rc::from("p"), uri: Rc::from("urn:x") },
                XbisEvent::StartElement {
                    prefix: Rc::from("p"),
                    uri: Rc::from("urn:x"),
                    local: Rc::from("e"),
                },
                XbisEvent::StartElement {
                    prefix: Rc::from("p"),
                    uri: Rc::from("urn:x"),
                    local: Rc::from("c"),
                },
                XbisEvent::EndElement,
                XbisEvent::EndElement,
                XbisEvent::EndDocument,
            ]
        );
    }

    #[test]
    fn default_namespace_applies_to_elements_only() {
        let events = parse_xml_events(r#"<e xmlns="urn:d" a="1"/>"#).unwrap();
        let start = &events[2];
        let attr = &events[3];
        match start {
            XbisEvent::StartElement { uri, .. } => assert_eq!(&**uri, "urn:d"),
            other => panic!("unexpected {other:?}"),
        }
        match attr {
            XbisEvent::Attribute { uri, local, value, .. } => {
                assert_eq!(&**uri, "");
                assert_eq!(&**local, "a");
                assert_eq!(&**value, "1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn scope_ends_with_element() {
        let xml = r#"<r><a xmlns:p="urn:x"><p:c/></a><b/></r>"#;
        let events = parse_xml_events(xml).unwrap();
        // <b> darf das Mapping von <a> nicht mehr sehen
        let b = events
            .iter()
            .find(|e| matches!(e, XbisEvent::StartElement { local, .. } if &**local == "b"))
            .unwrap();
        match b {
            XbisEvent::StartElement { uri, .. } => assert_eq!(&**uri, ""),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unbound_prefix_is_an_error() {
        let err = parse_xml_events("<p:e/>").unwrap_err();
        assert!(matches!(err, Error::XmlParse(_)), "{err:?}");
    }

    #[test]
    fn xml_prefix_is_predeclared() {
        let events = parse_xml_events(r#"<e xml:lang="de"/>"#).unwrap();
        match &events[2] {
            XbisEvent::Attribute { uri, .. } => assert_eq!(&**uri, XML_NAMESPACE),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_pi_and_comment_and_cdata() {
        let xml = "<d><?target some data?><!--note--><![CDATA[raw <>]]></d>";
        let events = parse_xml_events(xml).unwrap();
        assert!(events.contains(&XbisEvent::ProcessingInstruction {
            target: Rc::from("target"),
            data: Rc::from("some data"),
        }));
        assert!(events.contains(&XbisEvent::Comment(Rc::from("note"))));
        assert!(events.contains(&XbisEvent::Cdata(Rc::from("raw <>"))));
    }

    #[test]
    fn doctype_public_identifiers() {
        let e = parse_doctype(r#"html PUBLIC "-//W3C//DTD XHTML 1.0//EN" "xhtml1.dtd""#);
        assert_eq!(
            e,
            XbisEvent::DocType {
                name: Rc::from("html"),
                public_id: Rc::from("-//W3C//DTD XHTML 1.0//EN"),
                system_id: Rc::from("xhtml1.dtd"),
            }
        );
    }

    #[test]
    fn doctype_system_identifier() {
        let e = parse_doctype(r#"doc SYSTEM 'doc.dtd'"#);
        assert_eq!(
            e,
            XbisEvent::DocType {
                name: Rc::from("doc"),
                public_id: Rc::from(""),
                system_id: Rc::from("doc.dtd"),
            }
        );
    }
}
