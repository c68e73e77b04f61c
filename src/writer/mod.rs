//! XBIS stream encoder.
//!
//! [`EventWriter`] is the event-driven core: it consumes a stream of XML
//! parse events and emits XBIS bytes, building the handle dictionaries as a
//! side effect. [`PushWriter`] layers the deferred start-tag surface for
//! framework integration on top.
//!
//! Das Has-Children-Flag eines Elements ist beim Start-Tag noch unbekannt.
//! Statt den Teilbaum zu puffern wird das Lead-Byte markiert und beim ersten
//! Content-Event nachträglich gepatcht; zwischen Element-Start und erstem
//! Kind-/End-Event wird nie geflusht.
//!
//! # Beispiel
//!
//! ```
//! use xbis::writer::encode;
//! use xbis::XbisEvent;
//!
//! let events = vec![
//!     XbisEvent::StartDocument,
//!     XbisEvent::start_local("root"),
//!     XbisEvent::EndElement,
//!     XbisEvent::EndDocument,
//! ];
//! let bytes = encode(&events).unwrap();
//! assert!(!bytes.is_empty());
//! ```

mod push;

pub use push::PushWriter;

use std::io::Write;
use std::rc::Rc;

use crate::buffer::OutputBuffer;
use crate::event::XbisEvent;
use crate::header::{self, StreamHeader};
use crate::node::{
    ATTRIBUTE_HANDLE_MASK, ATTRIBUTE_NEWNAME_FLAG, ATTRIBUTE_NEWREF_FLAG, ATTRIBUTE_VALUEREF_FLAG,
    ELEMENT_HANDLE_MASK, ELEMENT_HASATTRIBUTES_FLAG, ELEMENT_HASCHILDREN_FLAG,
    ELEMENT_NEWNAME_FLAG, JIBX_SOURCE_ID, NAMESPACEDECL_HANDLE_MASK, NAMESPACEDECL_NEWDEF_FLAG,
    NODE_ELEMENT_FLAG, NODE_NAMESPACEDECL_FLAG, NODE_PLAINTEXT_FLAG, NODE_TEXTREF_FLAG,
    NODE_TYPE_ATTRIBUTEDECL, NODE_TYPE_CDATA, NODE_TYPE_COMMENT, NODE_TYPE_DOCTYPE,
    NODE_TYPE_DOCUMENT, NODE_TYPE_ELEMENTDECL, NODE_TYPE_EXTERNALENTITYDECL, NODE_TYPE_NOTATION,
    NODE_TYPE_PI, NODE_TYPE_SKIPPEDENTITY, NODE_TYPE_UNPARSEDENTITY, PLAINTEXT_LENGTH_MASK,
    TEXTREF_HANDLE_MASK, TEXTREF_NEWDEF_FLAG,
};
use crate::qname::NsId;
use crate::tables::{NameTable, NamespaceRegistry, SharedValues};
use crate::value;
use crate::{Error, Result};

/// Encoder configuration.
///
/// Die Share-Tiefen steuern ab welcher Byte-Länge Texte bzw. Attributwerte
/// in die Shared-Tables wandern; 0 deaktiviert das Sharing komplett.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Producer dialect id written into the stream header.
    pub source_id: u8,
    /// Share depth for character content (default 6, 0 disables).
    pub content_share_depth: u64,
    /// Share depth for attribute values (default 6, 0 disables).
    pub attribute_share_depth: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self { source_id: JIBX_SOURCE_ID, content_share_depth: 6, attribute_share_depth: 6 }
    }
}

/// Event-driven XBIS encoder over a byte sink.
pub struct EventWriter<W: Write> {
    sink: W,
    out: OutputBuffer,
    config: WriterConfig,
    namespaces: NamespaceRegistry,
    elements: NameTable,
    attributes: NameTable,
    shared_content: SharedValues,
    shared_attr_values: SharedValues,
    /// Mappings accumulated by `begin_namespace_mapping`, attached to the
    /// next element start.
    pending: Vec<NsId>,
    /// Declarations active in document order, closed per element level.
    decl_stack: Vec<NsId>,
    /// Emitted declaration count per open element.
    ns_counts: Vec<usize>,
    /// The last event was an element start whose lead byte is still marked.
    is_start: bool,
    /// An attribute list is open.
    in_attributes: bool,
    header_written: bool,
    is_reset: bool,
}

impl<W: Write> EventWriter<W> {
    pub fn new(sink: W) -> Self {
        Self::with_config(sink, WriterConfig::default())
    }

    pub fn with_config(sink: W, config: WriterConfig) -> Self {
        Self {
            sink,
            out: OutputBuffer::new(),
            config,
            namespaces: NamespaceRegistry::new(),
            elements: NameTable::new(),
            attributes: NameTable::new(),
            shared_content: SharedValues::new(),
            shared_attr_values: SharedValues::new(),
            pending: Vec::new(),
            decl_stack: Vec::new(),
            ns_counts: Vec::new(),
            is_start: false,
            in_attributes: false,
            header_written: false,
            is_reset: true,
        }
    }

    /// Writes the stream header. Idempotent until the next `reset`.
    pub fn init(&mut self) -> Result<()> {
        if !self.header_written {
            let h = StreamHeader {
                source_id: self.config.source_id,
                content_share_depth: self.config.content_share_depth,
                attribute_share_depth: self.config.attribute_share_depth,
            };
            header::encode(&mut self.out, &h);
            self.header_written = true;
            self.is_reset = false;
        }
        Ok(())
    }

    /// Sets or clears the content flag of the currently open element start,
    /// patching its marked lead byte and releasing the mark.
    pub fn set_has_content(&mut self, present: bool) {
        if self.is_start {
            if present {
                self.out.or_marked(ELEMENT_HASCHILDREN_FLAG);
            }
            self.out.clear_mark();
            self.is_start = false;
        }
    }

    pub fn write_document_start(&mut self) -> Result<()> {
        self.init()?;
        self.out.write_byte(NODE_TYPE_DOCUMENT);
        Ok(())
    }

    pub fn write_document_end(&mut self) -> Result<()> {
        self.out.write_byte(0);
        self.flush_buffer()
    }

    /// Accumulates a namespace mapping for the next element start.
    pub fn begin_namespace_mapping(&mut self, prefix: &str, uri: &str) -> Result<()> {
        let ns = self.namespaces.intern(prefix, uri);
        self.pending.push(ns);
        Ok(())
    }

    /// Writes an element start tag: pending declarations, then the lead byte
    /// (marked for later content patching) with a handle reference or a new
    /// name definition.
    pub fn write_element_start(
        &mut self,
        prefix: &str,
        uri: &str,
        local: &str,
        has_attributes: bool,
    ) -> Result<()> {
        self.init()?;

        // containing element definitively has content
        self.set_has_content(true);

        let ns = self.namespaces.intern(prefix, uri);

        // Pending declarations. Die Deklaration des Element-Namespaces wird
        // übersprungen wenn er bereits definiert ist — der Start-Tag selbst
        // stellt das Mapping dann wieder her.
        let mut emitted = 0usize;
        let pending = std::mem::take(&mut self.pending);
        for decl in pending {
            if decl == ns && self.namespaces.handle(ns).is_some() {
                continue;
            }
            self.write_namespace_decl(decl);
            emitted += 1;
        }

        let mut lead = NODE_ELEMENT_FLAG;
        if has_attributes {
            lead |= ELEMENT_HASATTRIBUTES_FLAG;
        }

        self.out.set_mark();
        self.is_start = true;
        let name = self.elements.intern(ns, local);
        match self.elements.handle(name) {
            Some(h) => value::write_quick(&mut self.out, h, lead, ELEMENT_HANDLE_MASK),
            None => {
                self.out.write_byte(lead | ELEMENT_NEWNAME_FLAG);
                self.write_namespace_ref(ns);
                value::write_string(&mut self.out, local);
                self.elements.define(name);
            }
        }

        self.ns_counts.push(emitted);
        self.in_attributes = has_attributes;
        Ok(())
    }

    /// Writes one attribute record of the open start tag.
    pub fn write_element_attribute(
        &mut self,
        prefix: &str,
        uri: &str,
        local: &str,
        attr_value: &str,
    ) -> Result<()> {
        if !self.in_attributes {
            return Err(Error::illegal_state("attribute outside an open start tag"));
        }
        let ns = self.namespaces.intern(prefix, uri);
        let name = self.attributes.intern(ns, local);

        let mut lead = 0u8;
        let share = self.config.attribute_share_depth;
        let eligible = share > 0 && attr_value.len() as u64 >= share;
        let mut value_handle = None;
        if eligible {
            if let Some(h) = self.shared_attr_values.lookup(attr_value) {
                lead |= ATTRIBUTE_VALUEREF_FLAG;
                value_handle = Some(h);
            } else {
                lead |= ATTRIBUTE_VALUEREF_FLAG | ATTRIBUTE_NEWREF_FLAG;
            }
        }

        match self.attributes.handle(name) {
            Some(h) => value::write_quick(&mut self.out, h, lead, ATTRIBUTE_HANDLE_MASK),
            None => {
                self.out.write_byte(lead | ATTRIBUTE_NEWNAME_FLAG);
                self.write_namespace_ref(ns);
                value::write_string(&mut self.out, local);
                self.attributes.define(name);
            }
        }

        match value_handle {
            Some(h) => value::write_value(&mut self.out, h),
            None => {
                value::write_string(&mut self.out, attr_value);
                if eligible {
                    self.shared_attr_values.insert(attr_value);
                }
            }
        }
        Ok(())
    }

    /// Terminates the open attribute list.
    pub fn write_attributes_end(&mut self) -> Result<()> {
        self.in_attributes = false;
        self.out.write_byte(0);
        Ok(())
    }

    /// Closes the current element and the namespace declarations scoped to
    /// it, in reverse declaration order.
    pub fn write_element_end(&mut self) -> Result<()> {
        self.set_has_content(false);
        self.in_attributes = false;
        self.out.write_byte(0);
        let count = self
            .ns_counts
            .pop()
            .ok_or_else(|| Error::illegal_state("element end without matching start"))?;
        for _ in 0..count {
            let ns = self.decl_stack.pop().expect("declaration stack in sync");
            self.namespaces.deactivate(ns);
        }
        Ok(())
    }

    /// Writes character data. Empty text is dropped; text at or above the
    /// content share depth goes through the shared-content table.
    pub fn write_char_data(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.set_has_content(true);
        let share = self.config.content_share_depth;
        if share > 0 && text.len() as u64 >= share {
            if let Some(h) = self.shared_content.lookup(text) {
                value::write_quick(&mut self.out, h, NODE_TEXTREF_FLAG, TEXTREF_HANDLE_MASK);
            } else {
                self.out.write_byte(NODE_TEXTREF_FLAG | TEXTREF_NEWDEF_FLAG);
                value::write_string(&mut self.out, text);
                self.shared_content.insert(text);
            }
        } else {
            value::write_quick(
                &mut self.out,
                text.len() as u64,
                NODE_PLAINTEXT_FLAG,
                PLAINTEXT_LENGTH_MASK,
            );
            self.out.extend(text.as_bytes());
        }
        Ok(())
    }

    pub fn write_cdata(&mut self, text: &str) -> Result<()> {
        self.set_has_content(true);
        self.out.write_byte(NODE_TYPE_CDATA);
        value::write_string(&mut self.out, text);
        Ok(())
    }

    pub fn write_comment(&mut self, text: &str) -> Result<()> {
        self.set_has_content(true);
        self.out.write_byte(NODE_TYPE_COMMENT);
        value::write_string(&mut self.out, text);
        Ok(())
    }

    pub fn write_pi(&mut self, target: &str, data: &str) -> Result<()> {
        self.set_has_content(true);
        self.out.write_byte(NODE_TYPE_PI);
        value::write_string(&mut self.out, target);
        value::write_string(&mut self.out, data);
        Ok(())
    }

    pub fn write_document_type(
        &mut self,
        name: &str,
        public_id: &str,
        system_id: &str,
    ) -> Result<()> {
        self.set_has_content(true);
        self.out.write_byte(NODE_TYPE_DOCTYPE);
        value::write_string(&mut self.out, name);
        value::write_string(&mut self.out, public_id);
        value::write_string(&mut self.out, system_id);
        Ok(())
    }

    pub fn write_notation(&mut self, name: &str, public_id: &str, system_id: &str) -> Result<()> {
        self.set_has_content(true);
        self.out.write_byte(NODE_TYPE_NOTATION);
        value::write_string(&mut self.out, name);
        value::write_string(&mut self.out, public_id);
        value::write_string(&mut self.out, system_id);
        Ok(())
    }

    pub fn write_unparsed_entity(
        &mut self,
        name: &str,
        public_id: &str,
        system_id: &str,
        notation: &str,
    ) -> Result<()> {
        self.set_has_content(true);
        self.out.write_byte(NODE_TYPE_UNPARSEDENTITY);
        value::write_string(&mut self.out, name);
        value::write_string(&mut self.out, public_id);
        value::write_string(&mut self.out, system_id);
        value::write_string(&mut self.out, notation);
        Ok(())
    }

    pub fn write_skipped_entity(&mut self, name: &str) -> Result<()> {
        self.set_has_content(true);
        self.out.write_byte(NODE_TYPE_SKIPPEDENTITY);
        value::write_string(&mut self.out, name);
        Ok(())
    }

    pub fn write_element_decl(&mut self, name: &str, model: &str) -> Result<()> {
        self.set_has_content(true);
        self.out.write_byte(NODE_TYPE_ELEMENTDECL);
        value::write_string(&mut self.out, name);
        value::write_string(&mut self.out, model);
        Ok(())
    }

    pub fn write_attribute_decl(
        &mut self,
        element: &str,
        attribute: &str,
        attr_type: &str,
        default_type: &str,
        default_value: &str,
    ) -> Result<()> {
        self.set_has_content(true);
        self.out.write_byte(NODE_TYPE_ATTRIBUTEDECL);
        value::write_string(&mut self.out, element);
        value::write_string(&mut self.out, attribute);
        value::write_string(&mut self.out, attr_type);
        value::write_string(&mut self.out, default_type);
        value::write_string(&mut self.out, default_value);
        Ok(())
    }

    pub fn write_external_entity_decl(
        &mut self,
        name: &str,
        public_id: &str,
        system_id: &str,
    ) -> Result<()> {
        self.set_has_content(true);
        self.out.write_byte(NODE_TYPE_EXTERNALENTITYDECL);
        value::write_string(&mut self.out, name);
        value::write_string(&mut self.out, public_id);
        value::write_string(&mut self.out, system_id);
        Ok(())
    }

    /// Forces the content flag of an open element start, then drains the
    /// buffer to the sink. Safe to call between any two events.
    pub fn flush(&mut self) -> Result<()> {
        self.set_has_content(true);
        self.flush_buffer()
    }

    fn flush_buffer(&mut self) -> Result<()> {
        self.out.drain_to(&mut self.sink)?;
        self.sink.flush()?;
        Ok(())
    }

    /// Drains remaining bytes and returns the sink.
    pub fn finish(mut self) -> Result<W> {
        self.flush_buffer()?;
        Ok(self.sink)
    }

    /// Number of bytes currently buffered.
    pub fn buffered_len(&self) -> usize {
        self.out.len()
    }

    /// Bytes buffered but not yet drained to the sink.
    pub fn buffered(&self) -> &[u8] {
        self.out.as_slice()
    }

    /// True while (prefix, uri) is bound by an open declaration scope.
    pub fn namespace_in_scope(&self, prefix: &str, uri: &str) -> bool {
        self.namespaces
            .find(prefix, uri)
            .is_some_and(|id| self.namespaces.is_active(id))
    }

    /// Reinitializes all per-document state so the instance can serialize
    /// another independent document. Idempotent.
    pub fn reset(&mut self) {
        if self.is_reset {
            return;
        }
        self.namespaces.reset();
        self.elements.clear();
        self.attributes.clear();
        self.shared_content.clear();
        self.shared_attr_values.clear();
        self.pending.clear();
        self.decl_stack.clear();
        self.ns_counts.clear();
        self.out.clear();
        self.is_start = false;
        self.in_attributes = false;
        self.header_written = false;
        self.is_reset = true;
    }

    /// Writes one namespace declaration node, defining the namespace on
    /// first occurrence, and opens its scope.
    fn write_namespace_decl(&mut self, ns: NsId) {
        match self.namespaces.handle(ns) {
            Some(h) => value::write_quick(
                &mut self.out,
                h,
                NODE_NAMESPACEDECL_FLAG,
                NAMESPACEDECL_HANDLE_MASK,
            ),
            None => {
                self.out.write_byte(NODE_NAMESPACEDECL_FLAG | NAMESPACEDECL_NEWDEF_FLAG);
                let prefix = Rc::clone(self.namespaces.prefix(ns));
                let uri = Rc::clone(self.namespaces.uri(ns));
                value::write_string(&mut self.out, &prefix);
                value::write_string(&mut self.out, &uri);
                self.namespaces.assign_handle(ns);
            }
        }
        self.namespaces.activate(ns);
        self.decl_stack.push(ns);
    }

    /// Writes a namespace reference inside a name definition. A reference to
    /// one past the defined count introduces an inline definition; inline
    /// definitions never open a scope.
    fn write_namespace_ref(&mut self, ns: NsId) {
        match self.namespaces.handle(ns) {
            Some(h) => value::write_value(&mut self.out, h),
            None => {
                let h = self.namespaces.assign_handle(ns);
                value::write_value(&mut self.out, h);
                let prefix = Rc::clone(self.namespaces.prefix(ns));
                let uri = Rc::clone(self.namespaces.uri(ns));
                value::write_string(&mut self.out, &prefix);
                value::write_string(&mut self.out, &uri);
            }
        }
    }
}

/// Encodes a complete event sequence with default configuration.
pub fn encode(events: &[XbisEvent]) -> Result<Vec<u8>> {
    encode_with_config(events, WriterConfig::default())
}

/// Encodes a complete event sequence.
///
/// Attribute events must directly follow their element start; the element's
/// has-attributes flag is derived by lookahead.
pub fn encode_with_config(events: &[XbisEvent], config: WriterConfig) -> Result<Vec<u8>> {
    let mut writer = EventWriter::with_config(Vec::new(), config);
    writer.init()?;
    let mut i = 0;
    while i < events.len() {
        match &events[i] {
            XbisEvent::StartDocument => writer.write_document_start()?,
            XbisEvent::EndDocument => writer.write_document_end()?,
            XbisEvent::NamespaceDeclaration { prefix, uri } => {
                writer.begin_namespace_mapping(prefix, uri)?;
            }
            XbisEvent::StartElement { prefix, uri, local } => {
                let hasa = matches!(events.get(i + 1), Some(XbisEvent::Attribute { .. }));
                writer.write_element_start(prefix, uri, local, hasa)?;
                if hasa {
                    while let Some(XbisEvent::Attribute { prefix, uri, local, value }) =
                        events.get(i + 1)
                    {
                        writer.write_element_attribute(prefix, uri, local, value)?;
                        i += 1;
                    }
                    writer.write_attributes_end()?;
                }
            }
            XbisEvent::Attribute { .. } => {
                return Err(Error::illegal_state("attribute without preceding start tag"));
            }
            XbisEvent::EndElement => writer.write_element_end()?,
            XbisEvent::Text(t) => writer.write_char_data(t)?,
            XbisEvent::Cdata(t) => writer.write_cdata(t)?,
            XbisEvent::Comment(t) => writer.write_comment(t)?,
            XbisEvent::ProcessingInstruction { target, data } => writer.write_pi(target, data)?,
            XbisEvent::DocType { name, public_id, system_id } => {
                writer.write_document_type(name, public_id, system_id)?;
            }
            XbisEvent::Notation { name, public_id, system_id } => {
                writer.write_notation(name, public_id, system_id)?;
            }
            XbisEvent::UnparsedEntity { name, public_id, system_id, notation } => {
                writer.write_unparsed_entity(name, public_id, system_id, notation)?;
            }
            XbisEvent::SkippedEntity(name) => writer.write_skipped_entity(name)?,
            XbisEvent::ElementDecl { name, model } => writer.write_element_decl(name, model)?,
            XbisEvent::AttributeDecl {
                element,
                attribute,
                attr_type,
                default_type,
                default_value,
            } => {
                writer.write_attribute_decl(
                    element,
                    attribute,
                    attr_type,
                    default_type,
                    default_value,
                )?;
            }
            XbisEvent::ExternalEntityDecl { name, public_id, system_id } => {
                writer.write_external_entity_decl(name, public_id, system_id)?;
            }
        }
        i += 1;
    }
    writer.finish()
}
