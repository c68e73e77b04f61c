//! Push-style writer surface with deferred start tags.
//!
//! Frameworks melden Attribute erst nach dem Start-Tag-Open; ob ein Element
//! Attribute hat, steht also beim Öffnen noch nicht fest. Der Start-Tag wird
//! deshalb gepuffert und erst beim ersten Attribut oder beim Schließen
//! geschrieben. Namespaces werden hier über Indizes in ein konstantes
//! URI-Array angesprochen; Position 0 muss "" sein, Position 1 der
//! XML-Namespace.
//!
//! Child-Writer teilen sich den darunterliegenden [`EventWriter`]
//! (`Rc<RefCell>`, single-threaded) und dürfen nicht verschachtelt mit dem
//! Parent benutzt werden.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use crate::qname::XML_PREFIX;
use crate::{Error, Result};

use super::{EventWriter, WriterConfig};

struct NsSlot {
    uri: Rc<str>,
    prefix: Option<Rc<str>>,
    /// Element depth at which this index was declared, `None` when closed.
    open_depth: Option<u32>,
}

/// Push-based writer over a shared [`EventWriter`].
pub struct PushWriter<W: Write> {
    core: Rc<RefCell<EventWriter<W>>>,
    slots: Vec<NsSlot>,
    depth: u32,
    is_child: bool,
    /// An element start has been reported but not yet closed.
    is_start: bool,
    /// The deferred start tag has been written to the stream.
    is_written: bool,
    ns_index: usize,
    element_name: String,
}

impl<W: Write> PushWriter<W> {
    /// Creates a writer over `sink`. `uris[0]` must be the empty string and
    /// `uris[1]` the XML namespace URI.
    pub fn new(sink: W, uris: &[&str]) -> Self {
        Self::with_config(sink, uris, WriterConfig::default())
    }

    pub fn with_config(sink: W, uris: &[&str], config: WriterConfig) -> Self {
        let core = Rc::new(RefCell::new(EventWriter::with_config(sink, config)));
        Self::from_core(core, uris, false)
    }

    fn from_core(core: Rc<RefCell<EventWriter<W>>>, uris: &[&str], is_child: bool) -> Self {
        let mut writer = Self {
            core,
            slots: Vec::new(),
            depth: 0,
            is_child,
            is_start: false,
            is_written: false,
            ns_index: 0,
            element_name: String::new(),
        };
        writer.set_namespace_uris(uris);
        writer
    }

    /// Writes the stream header. Idempotent.
    pub fn init(&mut self) -> Result<()> {
        self.core.borrow_mut().init()
    }

    /// Replaces the namespace URI array. Intended only for reconfiguring an
    /// existing writer for reuse with the same output stream.
    pub fn set_namespace_uris(&mut self, uris: &[&str]) {
        self.slots = uris
            .iter()
            .map(|u| NsSlot { uri: Rc::from(*u), prefix: None, open_depth: None })
            .collect();
        // Die zwei festen Einträge sind immer deklariert.
        if let Some(slot) = self.slots.get_mut(0) {
            slot.prefix = Some(Rc::from(""));
            slot.open_depth = Some(0);
        }
        if let Some(slot) = self.slots.get_mut(1) {
            slot.prefix = Some(Rc::from(XML_PREFIX));
            slot.open_depth = Some(0);
        }
    }

    /// Emits the document start; version and encoding are not represented in
    /// the binary form.
    pub fn write_xml_decl(
        &mut self,
        _version: &str,
        _encoding: Option<&str>,
        _standalone: Option<&str>,
    ) -> Result<()> {
        self.core.borrow_mut().write_document_start()
    }

    /// Opens a start tag; nothing is written until the attribute status is
    /// known.
    pub fn start_tag_open(&mut self, ns_index: usize, local: &str) -> Result<()> {
        self.check_index(ns_index)?;
        self.ns_index = ns_index;
        self.element_name.clear();
        self.element_name.push_str(local);
        self.is_start = true;
        self.is_written = false;
        self.depth += 1;
        Ok(())
    }

    /// Opens a start tag and declares the namespaces newly visible at this
    /// element, forwarding them as pending mappings.
    pub fn start_tag_namespaces(
        &mut self,
        ns_index: usize,
        local: &str,
        ns_indices: &[usize],
        prefixes: &[&str],
    ) -> Result<()> {
        self.start_tag_open(ns_index, local)?;
        let deltas = self.open_namespaces(ns_indices, prefixes)?;
        for slot in deltas {
            let (prefix, uri) = {
                let s = &self.slots[slot];
                (s.prefix.clone().unwrap_or_else(|| Rc::from("")), Rc::clone(&s.uri))
            };
            self.core.borrow_mut().begin_namespace_mapping(&prefix, &uri)?;
        }
        Ok(())
    }

    /// Adds an attribute to the open start tag, writing the deferred element
    /// start on first use.
    pub fn add_attribute(&mut self, ns_index: usize, local: &str, attr_value: &str) -> Result<()> {
        if !self.is_start {
            return Err(Error::illegal_state("not in an open start tag"));
        }
        self.check_index(ns_index)?;
        if !self.is_written {
            self.write_start(true)?;
        }
        let (prefix, uri) = self.ns_pair(ns_index);
        self.core.borrow_mut().write_element_attribute(&prefix, &uri, local, attr_value)
    }

    /// Closes the start tag (content may follow).
    pub fn close_start_tag(&mut self) -> Result<()> {
        if self.is_written {
            self.core.borrow_mut().write_attributes_end()?;
        } else {
            self.write_start(false)?;
        }
        self.is_start = false;
        Ok(())
    }

    /// Closes the start tag as an empty element.
    pub fn close_empty_tag(&mut self) -> Result<()> {
        self.close_start_tag()?;
        self.core.borrow_mut().write_element_end()?;
        self.decrement_nesting();
        Ok(())
    }

    /// Convenience: open and immediately close a start tag.
    pub fn start_tag_closed(&mut self, ns_index: usize, local: &str) -> Result<()> {
        self.start_tag_open(ns_index, local)?;
        self.close_start_tag()
    }

    /// Closes the current element.
    pub fn end_tag(&mut self, _ns_index: usize, _local: &str) -> Result<()> {
        self.core.borrow_mut().write_element_end()?;
        self.decrement_nesting();
        Ok(())
    }

    pub fn write_text_content(&mut self, text: &str) -> Result<()> {
        self.core.borrow_mut().write_char_data(text)
    }

    pub fn write_cdata(&mut self, text: &str) -> Result<()> {
        self.core.borrow_mut().write_cdata(text)
    }

    pub fn write_comment(&mut self, text: &str) -> Result<()> {
        self.core.borrow_mut().write_comment(text)
    }

    /// Entity references are outside this surface.
    pub fn write_entity_ref(&mut self, _name: &str) -> Result<()> {
        Err(Error::unsupported("entity reference"))
    }

    /// Document type declarations are outside this surface.
    pub fn write_doc_type(
        &mut self,
        _name: &str,
        _system_id: Option<&str>,
        _public_id: Option<&str>,
        _subset: Option<&str>,
    ) -> Result<()> {
        Err(Error::unsupported("document type declaration"))
    }

    /// Processing instructions are outside this surface.
    pub fn write_pi(&mut self, _target: &str, _data: &str) -> Result<()> {
        Err(Error::unsupported("processing instruction"))
    }

    /// Drains buffered bytes to the sink. No-op on child writers — only the
    /// root writer owns the flush.
    pub fn flush(&mut self) -> Result<()> {
        if !self.is_child {
            self.core.borrow_mut().flush()?;
        }
        Ok(())
    }

    /// Emits the document end and drains the buffer.
    pub fn close(&mut self) -> Result<()> {
        self.core.borrow_mut().write_document_end()
    }

    /// Resets both the push state and the underlying codec state.
    pub fn reset(&mut self) {
        self.core.borrow_mut().reset();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if i > 1 {
                slot.prefix = None;
                slot.open_depth = None;
            }
        }
        self.depth = 0;
        self.is_start = false;
        self.is_written = false;
    }

    /// Creates a child writer for a separate binding, sharing this writer's
    /// underlying byte writer.
    pub fn create_child_writer(&self, uris: &[&str]) -> PushWriter<W> {
        Self::from_core(Rc::clone(&self.core), uris, true)
    }

    /// Drains remaining bytes and returns the sink. Fails while child
    /// writers are alive.
    pub fn finish(self) -> Result<W> {
        match Rc::try_unwrap(self.core) {
            Ok(cell) => cell.into_inner().finish(),
            Err(_) => Err(Error::illegal_state("child writers still alive")),
        }
    }

    fn write_start(&mut self, has_attributes: bool) -> Result<()> {
        let (prefix, uri) = self.ns_pair(self.ns_index);
        {
            let mut core = self.core.borrow_mut();
            core.init()?;
            core.write_element_start(&prefix, &uri, &self.element_name, has_attributes)?;
        }
        self.is_written = true;
        Ok(())
    }

    /// Returns the namespaces newly declared by this element.
    fn open_namespaces(&mut self, ns_indices: &[usize], prefixes: &[&str]) -> Result<Vec<usize>> {
        let mut deltas = Vec::new();
        for (&idx, &prefix) in ns_indices.iter().zip(prefixes) {
            self.check_index(idx)?;
            let slot = &mut self.slots[idx];
            if slot.open_depth.is_some() {
                continue;
            }
            slot.prefix = Some(Rc::from(prefix));
            slot.open_depth = Some(self.depth);
            deltas.push(idx);
        }
        Ok(deltas)
    }

    /// Closes namespace indices declared at the current depth.
    fn decrement_nesting(&mut self) {
        for slot in &mut self.slots {
            if slot.open_depth == Some(self.depth) && self.depth > 0 {
                slot.open_depth = None;
                slot.prefix = None;
            }
        }
        self.depth = self.depth.saturating_sub(1);
    }

    fn ns_pair(&self, idx: usize) -> (Rc<str>, Rc<str>) {
        if idx == 0 {
            return (Rc::from(""), Rc::from(""));
        }
        let slot = &self.slots[idx];
        (slot.prefix.clone().unwrap_or_else(|| Rc::from("")), Rc::clone(&slot.uri))
    }

    fn check_index(&self, idx: usize) -> Result<()> {
        if idx < self.slots.len() {
            Ok(())
        } else {
            Err(Error::illegal_state("namespace index out of range"))
        }
    }
}
