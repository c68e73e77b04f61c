//! XBIS stream decoder.
//!
//! [`EventReader`] is a pull parser over the byte stream: `next_token`
//! classifies one lead byte at a time, maintaining the same dictionaries the
//! writer built (element names, attribute names, namespaces, shared values)
//! purely from the definition records in the stream.
//!
//! Namespace-Deklarationen werden nicht als Events gemeldet: sie werden beim
//! Lesen aktiviert, dem nächsten Element-Frame zugeordnet und bei dessen
//! End-Tag wieder deaktiviert.
//!
//! # Beispiel
//!
//! ```
//! use xbis::writer::encode;
//! use xbis::reader::decode;
//! use xbis::XbisEvent;
//!
//! let events = vec![
//!     XbisEvent::StartDocument,
//!     XbisEvent::start_local("greeting"),
//!     XbisEvent::Text("Hello".into()),
//!     XbisEvent::EndElement,
//!     XbisEvent::EndDocument,
//! ];
//! let bytes = encode(&events).unwrap();
//! assert_eq!(decode(&bytes).unwrap(), events);
//! ```


use std::io::Read;
use std::rc::Rc;

use crate::buffer::InputBuffer;
use crate::event::XbisEvent;
use crate::header::{self, StreamHeader};
use crate::node::{
    ATTRIBUTE_HANDLE_MASK, ATTRIBUTE_NEWNAME_FLAG, ATTRIBUTE_NEWREF_FLAG, ATTRIBUTE_VALUEREF_FLAG,
    ELEMENT_HANDLE_MASK, ELEMENT_HASATTRIBUTES_FLAG, ELEMENT_NEWNAME_FLAG,
    NAMESPACEDECL_HANDLE_MASK, NAMESPACEDECL_NEWDEF_FLAG, NODE_ELEMENT_FLAG,
    NODE_NAMESPACEDECL_FLAG, NODE_PLAINTEXT_FLAG, NODE_TEXTREF_FLAG, NODE_TYPE_ATTRIBUTEDECL,
    NODE_TYPE_CDATA, NODE_TYPE_COMMENT, NODE_TYPE_DOCTYPE, NODE_TYPE_DOCUMENT,
    NODE_TYPE_ELEMENTDECL, NODE_TYPE_EXTERNALENTITYDECL, NODE_TYPE_NOTATION, NODE_TYPE_PI,
    NODE_TYPE_SKIPPEDENTITY, NODE_TYPE_UNPARSEDENTITY, PLAINTEXT_LENGTH_MASK,
    TEXTREF_HANDLE_MASK, TEXTREF_NEWDEF_FLAG,
};
use crate::qname::{Name, NsId};
use crate::tables::{NameStore, ReaderNamespaces, ValueStore};
use crate::value;
use crate::{Error, Result};

/// Parse event codes reported by [`EventReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    StartDocument,
    EndDocument,
    StartTag,
    EndTag,
    Text,
    Cdata,
}

/// One open element: its name plus the number of namespace declarations
/// scoped to it.
struct Frame {
    name: Name,
    ns_decls: usize,
}

/// Pull decoder over a byte source.
pub struct EventReader<R: Read> {
    input: InputBuffer<R>,
    header: Option<StreamHeader>,
    namespaces: ReaderNamespaces,
    elements: NameStore,
    attributes: NameStore,
    shared_content: ValueStore,
    shared_attr_values: ValueStore,
    element_stack: Vec<Frame>,
    /// Activation order of declarations, popped per closing frame.
    decl_stack: Vec<NsId>,
    /// Declarations read since the last element start.
    pending_decls: usize,
    state: Option<Token>,
    current_name: Option<Name>,
    text: Option<Rc<str>>,
    attrs: Vec<(Name, Rc<str>)>,
    scratch: Vec<u8>,
    is_reset: bool,
}

impl<R: Read> EventReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            input: InputBuffer::new(source),
            header: None,
            namespaces: ReaderNamespaces::new(),
            elements: NameStore::new(),
            attributes: NameStore::new(),
            shared_content: ValueStore::new(),
            shared_attr_values: ValueStore::new(),
            element_stack: Vec::new(),
            decl_stack: Vec::new(),
            pending_decls: 0,
            state: None,
            current_name: None,
            text: None,
            attrs: Vec::new(),
            scratch: Vec::new(),
            is_reset: true,
        }
    }

    /// Reads and verifies the stream header.
    pub fn init(&mut self) -> Result<()> {
        let h = header::decode(&mut self.input)?;
        log::debug!(
            "XBIS stream: source id {}, share depths {}/{}",
            h.source_id,
            h.content_share_depth,
            h.attribute_share_depth
        );
        self.header = Some(h);
        self.is_reset = false;
        Ok(())
    }

    /// The decoded stream header, available after `init`.
    pub fn header(&self) -> Option<&StreamHeader> {
        self.header.as_ref()
    }

    /// Advances to the next parse event.
    pub fn next_token(&mut self) -> Result<Token> {
        self.is_reset = false;
        loop {
            if self.input.peek()?.is_none() {
                if self.element_stack.is_empty() {
                    self.state = Some(Token::EndDocument);
                    return Ok(Token::EndDocument);
                }
                return Err(Error::PrematureEndOfStream);
            }
            let lead = self.input.read_byte()?;
            if lead == 0 {
                return self.end_of_list();
            }
            if lead & NODE_ELEMENT_FLAG != 0 {
                return self.read_element(lead);
            }
            if lead & NODE_PLAINTEXT_FLAG != 0 {
                let len = value::read_quick(&mut self.input, lead, PLAINTEXT_LENGTH_MASK)?;
                if len > isize::MAX as u64 {
                    return Err(Error::InvalidStringLength);
                }
                self.scratch.clear();
                self.input.read_exact_into(len as usize, &mut self.scratch)?;
                let s = std::str::from_utf8(&self.scratch).map_err(|_| Error::InvalidUtf8)?;
                self.text = Some(Rc::from(s));
                self.state = Some(Token::Text);
                return Ok(Token::Text);
            }
            if lead & NODE_TEXTREF_FLAG != 0 {
                if lead & TEXTREF_NEWDEF_FLAG != 0 {
                    let s = value::read_string(&mut self.input, &mut self.scratch)?;
                    self.shared_content.define(Rc::clone(&s));
                    self.text = Some(s);
                } else {
                    let h = value::read_quick(&mut self.input, lead, TEXTREF_HANDLE_MASK)?;
                    self.text = Some(Rc::clone(self.shared_content.lookup(h)?));
                }
                self.state = Some(Token::Text);
                return Ok(Token::Text);
            }
            if lead & NODE_NAMESPACEDECL_FLAG != 0 {
                self.read_namespace_decl(lead)?;
                continue;
            }
            match lead {
                NODE_TYPE_CDATA => {
                    let s = value::read_string(&mut self.input, &mut self.scratch)?;
                    self.text = Some(s);
                    self.state = Some(Token::Cdata);
                    return Ok(Token::Cdata);
                }
                NODE_TYPE_DOCUMENT => {
                    self.state = Some(Token::StartDocument);
                    return Ok(Token::StartDocument);
                }
                NODE_TYPE_COMMENT | NODE_TYPE_SKIPPEDENTITY => self.discard_strings(1)?,
                NODE_TYPE_PI | NODE_TYPE_ELEMENTDECL => self.discard_strings(2)?,
                NODE_TYPE_DOCTYPE | NODE_TYPE_NOTATION | NODE_TYPE_EXTERNALENTITYDECL => {
                    self.discard_strings(3)?;
                }
                NODE_TYPE_UNPARSEDENTITY => self.discard_strings(4)?,
                NODE_TYPE_ATTRIBUTEDECL => self.discard_strings(5)?,
                other => return Err(Error::UnknownNodeType(other)),
            }
            // übersprungener Knoten — weiter mit dem nächsten Lead-Byte
        }
    }

    /// Advances to the next principal event (document, tag, text, CDATA).
    pub fn next(&mut self) -> Result<Token> {
        loop {
            match self.next_token()? {
                t @ (Token::StartDocument
                | Token::EndDocument
                | Token::StartTag
                | Token::EndTag
                | Token::Text
                | Token::Cdata) => return Ok(t),
            }
        }
    }

    /// Current event without advancing, `None` before the first advance.
    pub fn event_type(&self) -> Option<Token> {
        self.state
    }

    /// Local name of the current start or end tag.
    pub fn name(&self) -> Result<&str> {
        self.tag_name().map(Name::local)
    }

    /// Namespace URI of the current start or end tag ("" for none).
    pub fn namespace_uri(&self) -> Result<&str> {
        let name = self.tag_name()?;
        Ok(self.namespaces.uri(name.namespace()))
    }

    /// Prefix of the current start or end tag, `None` for no prefix.
    pub fn prefix(&self) -> Result<Option<&str>> {
        let name = self.tag_name()?;
        let prefix = self.namespaces.prefix(name.namespace());
        Ok(if prefix.is_empty() { None } else { Some(prefix) })
    }

    /// Number of attributes of the current start tag.
    pub fn attribute_count(&self) -> Result<usize> {
        self.check_start_tag()?;
        Ok(self.attrs.len())
    }

    /// Local name of attribute `index`.
    pub fn attribute_name(&self, index: usize) -> Result<&str> {
        Ok(self.attribute_at(index)?.0.local())
    }

    /// Namespace URI of attribute `index` ("" for none).
    pub fn attribute_namespace(&self, index: usize) -> Result<&str> {
        let (name, _) = self.attribute_at(index)?;
        Ok(self.namespaces.uri(name.namespace()))
    }

    /// Prefix of attribute `index`, `None` for no prefix.
    pub fn attribute_prefix(&self, index: usize) -> Result<Option<&str>> {
        let (name, _) = self.attribute_at(index)?;
        let prefix = self.namespaces.prefix(name.namespace());
        Ok(if prefix.is_empty() { None } else { Some(prefix) })
    }

    /// Value of attribute `index`.
    pub fn attribute_value(&self, index: usize) -> Result<&str> {
        Ok(self.attribute_at(index)?.1)
    }

    /// Value of the attribute matching (uri, local), `None` when missing.
    /// `None` and `""` both select the empty namespace.
    pub fn attribute_value_named(&self, uri: Option<&str>, local: &str) -> Result<Option<&str>> {
        self.check_start_tag()?;
        for (name, attr_value) in &self.attrs {
            if name.local() == local && self.namespace_matches(uri, name.namespace()) {
                return Ok(Some(attr_value));
            }
        }
        Ok(None)
    }

    /// Character data of the current TEXT or CDSECT event.
    pub fn text(&self) -> Result<&str> {
        match self.state {
            Some(Token::Text | Token::Cdata) => {
                Ok(self.text.as_deref().expect("text present at text event"))
            }
            _ => Err(Error::illegal_state("not positioned on a text event")),
        }
    }

    /// Always true; the codec is inherently namespace-aware.
    pub fn is_namespace_aware(&self) -> bool {
        true
    }

    /// The codec is not byte-encoding-oriented; always `None`.
    pub fn input_encoding(&self) -> Option<&str> {
        None
    }

    /// Document name is never known; always `None`.
    pub fn document_name(&self) -> Option<&str> {
        None
    }

    /// Line positions are not tracked; always -1.
    pub fn line_number(&self) -> i32 {
        -1
    }

    /// Column positions are not tracked; always -1.
    pub fn column_number(&self) -> i32 {
        -1
    }

    /// Placeholder parse position description.
    pub fn position_string(&self) -> &'static str {
        "unknown location"
    }

    /// Namespace stack depth queries are not part of this codec's surface.
    pub fn nesting_depth(&self) -> Result<usize> {
        Err(Error::unsupported("nesting depth query"))
    }

    /// Namespace stack queries are not part of this codec's surface.
    pub fn namespace_count(&self, _depth: usize) -> Result<usize> {
        Err(Error::unsupported("namespace stack query"))
    }

    /// Namespace stack queries are not part of this codec's surface.
    pub fn namespace_uri_at(&self, _index: usize) -> Result<&str> {
        Err(Error::unsupported("namespace stack query"))
    }

    /// Namespace stack queries are not part of this codec's surface.
    pub fn namespace_prefix_at(&self, _index: usize) -> Result<Option<&str>> {
        Err(Error::unsupported("namespace stack query"))
    }

    /// Prefix resolution is not part of this codec's surface.
    pub fn namespace_for_prefix(&self, _prefix: &str) -> Result<Option<&str>> {
        Err(Error::unsupported("namespace stack query"))
    }

    /// Reinitializes all per-document state. Idempotent.
    pub fn reset(&mut self) {
        if self.is_reset {
            return;
        }
        self.header = None;
        self.namespaces.reset();
        self.elements.clear();
        self.attributes.clear();
        self.shared_content.clear();
        self.shared_attr_values.clear();
        self.element_stack.clear();
        self.decl_stack.clear();
        self.pending_decls = 0;
        self.state = None;
        self.current_name = None;
        self.text = None;
        self.attrs.clear();
        self.is_reset = true;
    }

    fn tag_name(&self) -> Result<&Name> {
        match self.state {
            Some(Token::StartTag | Token::EndTag) => {
                Ok(self.current_name.as_ref().expect("name present at tag event"))
            }
            _ => Err(Error::illegal_state("not positioned on a start or end tag")),
        }
    }

    fn check_start_tag(&self) -> Result<()> {
        match self.state {
            Some(Token::StartTag) => Ok(()),
            _ => Err(Error::illegal_state("not positioned on a start tag")),
        }
    }

    fn attribute_at(&self, index: usize) -> Result<(&Name, &str)> {
        self.check_start_tag()?;
        match self.attrs.get(index) {
            Some((name, attr_value)) => Ok((name, attr_value)),
            None => Err(Error::illegal_state("attribute index past maximum")),
        }
    }

    fn namespace_matches(&self, uri: Option<&str>, ns: NsId) -> bool {
        let have = self.namespaces.uri(ns);
        match uri {
            None | Some("") => have.is_empty(),
            Some(u) => &**have == u,
        }
    }

    /// A zero byte terminates either the current element or the document.
    fn end_of_list(&mut self) -> Result<Token> {
        match self.element_stack.pop() {
            Some(frame) => {
                for _ in 0..frame.ns_decls {
                    let ns = self.decl_stack.pop().expect("declaration stack in sync");
                    self.namespaces.deactivate(ns);
                }
                self.current_name = Some(frame.name);
                self.state = Some(Token::EndTag);
                Ok(Token::EndTag)
            }
            None => {
                self.state = Some(Token::EndDocument);
                Ok(Token::EndDocument)
            }
        }
    }

    fn read_element(&mut self, lead: u8) -> Result<Token> {
        let name = if lead & ELEMENT_NEWNAME_FLAG != 0 {
            let ns = self.read_namespace_ref()?;
            let local = value::read_string(&mut self.input, &mut self.scratch)?;
            self.elements.define(Name::new(ns, local)).clone()
        } else {
            let h = value::read_quick(&mut self.input, lead, ELEMENT_HANDLE_MASK)?;
            self.elements.lookup(h)?.clone()
        };

        self.attrs.clear();
        if lead & ELEMENT_HASATTRIBUTES_FLAG != 0 {
            loop {
                let alead = self.input.read_byte()?;
                if alead == 0 {
                    break;
                }
                let aname = if alead & ATTRIBUTE_NEWNAME_FLAG != 0 {
                    let ns = self.read_namespace_ref()?;
                    let local = value::read_string(&mut self.input, &mut self.scratch)?;
                    self.attributes.define(Name::new(ns, local)).clone()
                } else {
                    let h = value::read_quick(&mut self.input, alead, ATTRIBUTE_HANDLE_MASK)?;
                    self.attributes.lookup(h)?.clone()
                };
                let attr_value = if alead & ATTRIBUTE_VALUEREF_FLAG != 0 {
                    if alead & ATTRIBUTE_NEWREF_FLAG != 0 {
                        let s = value::read_string(&mut self.input, &mut self.scratch)?;
                        self.shared_attr_values.define(Rc::clone(&s));
                        s
                    } else {
                        let h = value::read_value(&mut self.input)?;
                        Rc::clone(self.shared_attr_values.lookup(h)?)
                    }
                } else {
                    value::read_string(&mut self.input, &mut self.scratch)?
                };
                self.attrs.push((aname, attr_value));
            }
        }

        let ns_decls = self.pending_decls;
        self.pending_decls = 0;
        self.element_stack.push(Frame { name: name.clone(), ns_decls });
        self.current_name = Some(name);
        self.state = Some(Token::StartTag);
        Ok(Token::StartTag)
    }

    /// Reads a namespace declaration, activates it, and attaches it to the
    /// next element frame. Never surfaces as an event.
    fn read_namespace_decl(&mut self, lead: u8) -> Result<()> {
        let ns = if lead & NAMESPACEDECL_NEWDEF_FLAG != 0 {
            let prefix = value::read_string(&mut self.input, &mut self.scratch)?;
            let uri = value::read_string(&mut self.input, &mut self.scratch)?;
            self.namespaces.define(prefix, uri)
        } else {
            let h = value::read_quick(&mut self.input, lead, NAMESPACEDECL_HANDLE_MASK)?;
            self.namespaces.lookup(h)?
        };
        self.namespaces.activate(ns);
        self.decl_stack.push(ns);
        self.pending_decls += 1;
        Ok(())
    }

    /// Reads a namespace reference inside a name definition. The value one
    /// past the defined count introduces an inline definition, which does
    /// not open a scope.
    fn read_namespace_ref(&mut self) -> Result<NsId> {
        let v = value::read_value(&mut self.input)?;
        let len = self.namespaces.len() as u64;
        if v >= 1 && v <= len {
            return self.namespaces.lookup(v);
        }
        if v == len + 1 {
            let prefix = value::read_string(&mut self.input, &mut self.scratch)?;
            let uri = value::read_string(&mut self.input, &mut self.scratch)?;
            return Ok(self.namespaces.define(prefix, uri));
        }
        Err(Error::HandleOutOfRange { handle: v, defined: len as usize })
    }

    fn discard_strings(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            value::read_string(&mut self.input, &mut self.scratch)?;
        }
        Ok(())
    }

    /// True while (prefix, uri) is bound by an open declaration scope.
    pub fn namespace_in_scope(&self, prefix: &str, uri: &str) -> bool {
        (0..self.namespaces.len()).any(|i| {
            let id = NsId(i as u32);
            &**self.namespaces.prefix(id) == prefix
                && &**self.namespaces.uri(id) == uri
                && self.namespaces.is_active(id)
        })
    }
}

/// Decodes a complete XBIS byte stream into an event sequence.
pub fn decode(data: &[u8]) -> Result<Vec<XbisEvent>> {
    let mut reader = EventReader::new(std::io::Cursor::new(data));
    reader.init()?;
    let mut events = Vec::new();
    loop {
        match reader.next_token()? {
            Token::StartDocument => events.push(XbisEvent::StartDocument),
            Token::EndDocument => {
                events.push(XbisEvent::EndDocument);
                return Ok(events);
            }
            Token::StartTag => {
                events.push(XbisEvent::StartElement {
                    prefix: Rc::from(reader.prefix()?.unwrap_or("")),
                    uri: Rc::from(reader.namespace_uri()?),
                    local: Rc::from(reader.name()?),
                });
                for i in 0..reader.attribute_count()? {
                    events.push(XbisEvent::Attribute {
                        prefix: Rc::from(reader.attribute_prefix(i)?.unwrap_or("")),
                        uri: Rc::from(reader.attribute_namespace(i)?),
                        local: Rc::from(reader.attribute_name(i)?),
                        value: Rc::from(reader.attribute_value(i)?),
                    });
                }
            }
            Token::EndTag => events.push(XbisEvent::EndElement),
            Token::Text => events.push(XbisEvent::Text(Rc::from(reader.text()?))),
            Token::Cdata => events.push(XbisEvent::Cdata(Rc::from(reader.text()?))),
        }
    }
}
