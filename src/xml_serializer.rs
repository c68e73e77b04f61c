//! XBIS events to XML text.
//!
//! Rekonstruiert die xmlns-Deklarationen aus einem eigenen Scope-Stack: der
//! Event-Strom trägt (Prefix, URI)-Paare an jedem Namen, Deklarationen
//! werden also genau dort ausgegeben, wo ein Binding noch nicht sichtbar
//! ist.

use std::rc::Rc;

use quick_xml::escape::escape;

use crate::event::XbisEvent;
use crate::reader::decode;
use crate::{Error, Result};

/// Decodes an XBIS byte stream and serializes it as XML text.
pub fn decode_to_xml(data: &[u8]) -> Result<String> {
    let events = decode(data)?;
    events_to_xml(&events)
}

struct Scope {
    depth: usize,
    prefix: Rc<str>,
    uri: Rc<str>,
}

/// Serializes an event sequence as XML text.
///
/// DTD-internal declaration events (notation, entity, element and attribute
/// declarations) have no standalone XML form and are skipped.
pub fn events_to_xml(events: &[XbisEvent]) -> Result<String> {
    let mut out = String::new();
    let mut scopes: Vec<Scope> = Vec::new();
    let mut pending: Vec<(Rc<str>, Rc<str>)> = Vec::new();
    let mut open: Vec<(Rc<str>, Rc<str>)> = Vec::new();
    let mut depth = 0usize;

    let mut i = 0;
    while i < events.len() {
        match &events[i] {
            XbisEvent::StartDocument => {
                out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
            }
            XbisEvent::EndDocument => {}
            XbisEvent::NamespaceDeclaration { prefix, uri } => {
                pending.push((Rc::clone(prefix), Rc::clone(uri)));
            }
            XbisEvent::StartElement { prefix, uri, local } => {
                depth += 1;
                out.push('<');
                push_qname(&mut out, prefix, local);
                for (p, u) in std::mem::take(&mut pending) {
                    declare(&mut out, &mut scopes, depth, p, u);
                }
                ensure_bound(&mut out, &mut scopes, depth, prefix, uri)?;

                // Attribute folgen direkt auf ihren Start-Tag
                let mut j = i + 1;
                while let Some(XbisEvent::Attribute { prefix, uri, local, value }) = events.get(j)
                {
                    if prefix.is_empty() && !uri.is_empty() {
                        return Err(Error::unsupported(
                            "attribute in a namespace without prefix",
                        ));
                    }
                    if !prefix.is_empty() {
                        ensure_bound(&mut out, &mut scopes, depth, prefix, uri)?;
                    }
                    out.push(' ');
                    push_qname(&mut out, prefix, local);
                    out.push_str("=\"");
                    out.push_str(&escape(&**value));
                    out.push('"');
                    j += 1;
                }
                i = j - 1;

                if matches!(events.get(i + 1), Some(XbisEvent::EndElement)) {
                    out.push_str("/>");
                    scopes.retain(|s| s.depth != depth);
                    depth -= 1;
                    i += 1;
                } else {
                    out.push('>');
                    open.push((Rc::clone(prefix), Rc::clone(local)));
                }
            }
            XbisEvent::EndElement => {
                let (prefix, local) = open
                    .pop()
                    .ok_or_else(|| Error::illegal_state("end tag without open element"))?;
                out.push_str("</");
                push_qname(&mut out, &prefix, &local);
                out.push('>');
                scopes.retain(|s| s.depth != depth);
                depth = depth.saturating_sub(1);
            }
            XbisEvent::Attribute { .. } => {
                return Err(Error::illegal_state("attribute without preceding start tag"));
            }
            XbisEvent::Text(t) => out.push_str(&escape(&**t)),
            XbisEvent::Cdata(t) => {
                out.push_str("<![CDATA[");
                // "]]>" darf in einer CDATA-Sektion nicht vorkommen
                out.push_str(&t.replace("]]>", "]]]]><![CDATA[>"));
                out.push_str("]]>");
            }
            XbisEvent::Comment(t) => {
                out.push_str("<!--");
                out.push_str(t);
                out.push_str("-->");
            }
            XbisEvent::ProcessingInstruction { target, data } => {
                out.push_str("<?");
                out.push_str(target);
                if !data.is_empty() {
                    out.push(' ');
                    out.push_str(data);
                }
                out.push_str("?>");
            }
            XbisEvent::DocType { name, public_id, system_id } => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                if !public_id.is_empty() {
                    out.push_str(" PUBLIC \"");
                    out.push_str(public_id);
                    out.push_str("\" \"");
                    out.push_str(system_id);
                    out.push('"');
                } else if !system_id.is_empty() {
                    out.push_str(" SYSTEM \"");
                    out.push_str(system_id);
                    out.push('"');
                }
                out.push('>');
            }
            // DTD-interne Deklarationen: keine eigenständige XML-Form
            XbisEvent::Notation { .. }
            | XbisEvent::UnparsedEntity { .. }
            | XbisEvent::SkippedEntity(_)
            | XbisEvent::ElementDecl { .. }
            | XbisEvent::AttributeDecl { .. }
            | XbisEvent::ExternalEntityDecl { .. } => {}
        }
        i += 1;
    }
    Ok(out)
}

fn push_qname(out: &mut String, prefix: &str, local: &str) {
    if !prefix.is_empty() {
        out.push_str(prefix);
        out.push(':');
    }
    out.push_str(local);
}

/// Current binding of `prefix`, innermost scope first.
fn lookup<'a>(scopes: &'a [Scope], prefix: &str) -> Option<&'a str> {
    scopes
        .iter()
        .rev()
        .find(|s| &*s.prefix == prefix)
        .map(|s| &*s.uri)
}

/// Writes an xmlns attribute and records the binding.
fn declare(out: &mut String, scopes: &mut Vec<Scope>, depth: usize, prefix: Rc<str>, uri: Rc<str>) {
    out.push_str(" xmlns");
    if !prefix.is_empty() {
        out.push(':');
        out.push_str(&prefix);
    }
    out.push_str("=\"");
    out.push_str(&escape(&*uri));
    out.push('"');
    scopes.push(Scope { depth, prefix, uri });
}

/// Declares (prefix, uri) at the current element unless already bound.
fn ensure_bound(
    out: &mut String,
    scopes: &mut Vec<Scope>,
    depth: usize,
    prefix: &str,
    uri: &str,
) -> Result<()> {
    if prefix == "xml" {
        return Ok(());
    }
    let bound = lookup(scopes, prefix).unwrap_or("");
    if bound != uri {
        declare(out, scopes, depth, Rc::from(prefix), Rc::from(uri));
    }
    Ok(())
}
