//! Namespaces and qualified names.
//!
//! Namespaces are interned per codec instance; identity is the table index,
//! equality is (prefix, URI). Names pair a local name with the namespace id.
//! Zwei Namespaces sind bei jeder Instanz vorab interniert: der leere
//! Namespace an Index 0 und der XML-Namespace an Index 1.

use std::fmt;
use std::rc::Rc;

/// The fixed XML namespace URI, pre-interned at index 1.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// The prefix bound to [`XML_NAMESPACE`].
pub const XML_PREFIX: &str = "xml";

/// Index into a codec instance's namespace table. `Copy`-Type, kein Heap;
/// Vergleich ist ein u32-Vergleich statt zwei String-Vergleiche.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NsId(pub(crate) u32);

impl NsId {
    /// The pre-interned empty namespace ("", "").
    pub const NO_NAMESPACE: NsId = NsId(0);
    /// The pre-interned XML namespace.
    pub const XML: NsId = NsId(1);

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NsId({})", self.0)
    }
}

/// An element or attribute name: local name plus namespace identity.
///
/// Element- und Attributnamen leben in getrennten Handle-Räumen; der Name
/// selbst weiß nichts von seinem Handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub(crate) ns: NsId,
    pub(crate) local: Rc<str>,
}

impl Name {
    pub(crate) fn new(ns: NsId, local: Rc<str>) -> Self {
        Self { ns, local }
    }

    /// Local part of the name.
    pub fn local(&self) -> &str {
        &self.local
    }

    /// Namespace identity of the name.
    pub fn namespace(&self) -> NsId {
        self.ns
    }
}
