//! Per-document dictionaries: the namespace registry, the writer-side name
//! maps, and the shared-value tables.
//!
//! Handles sind 1-basiert und werden strikt in der Reihenfolge der ersten
//! Stream-Definition vergeben; Handle 0 ist nirgends gültig (Terminator).
//! Beide Seiten müssen dieselbe Reihenfolge sehen — auf der Writer-Seite
//! hält die Registry Definition-Handles, auf der Reader-Seite ist die
//! Tabellenposition selbst das Handle.

use std::rc::Rc;

use crate::qname::{Name, NsId, XML_NAMESPACE, XML_PREFIX};
use crate::{Error, FastHashMap, FastIndexMap, Result};

// ============================================================================
// Namespace registry (writer side)
// ============================================================================

struct NsRecord {
    /// Wire definition handle, assigned on first in-stream definition.
    handle: Option<u64>,
    /// Active nesting count; a namespace is in scope iff count > 0.
    nesting: u32,
}

/// Writer-side namespace interning keyed by (prefix, URI).
///
/// Insertion order is deterministic (IndexMap), so `NsId` values are stable
/// identities for the lifetime of the instance.
pub(crate) struct NamespaceRegistry {
    entries: FastIndexMap<(Rc<str>, Rc<str>), NsRecord>,
    defined: u64,
}

impl NamespaceRegistry {
    pub(crate) fn new() -> Self {
        let mut reg = Self { entries: FastIndexMap::default(), defined: 0 };
        reg.seed();
        reg
    }

    /// Die zwei vorab internierten Namespaces mit den Handles 1 und 2.
    fn seed(&mut self) {
        self.entries.insert(
            (Rc::from(""), Rc::from("")),
            NsRecord { handle: Some(1), nesting: 1 },
        );
        self.entries.insert(
            (Rc::from(XML_PREFIX), Rc::from(XML_NAMESPACE)),
            NsRecord { handle: Some(2), nesting: 1 },
        );
        self.defined = 2;
    }

    /// Resolves or creates the namespace for (prefix, uri).
    pub(crate) fn intern(&mut self, prefix: &str, uri: &str) -> NsId {
        if let Some(id) = self.find(prefix, uri) {
            return id;
        }
        let idx = self.entries.len();
        self.entries.insert(
            (Rc::from(prefix), Rc::from(uri)),
            NsRecord { handle: None, nesting: 0 },
        );
        NsId(idx as u32)
    }

    /// Looks up an already-interned namespace.
    pub(crate) fn find(&self, prefix: &str, uri: &str) -> Option<NsId> {
        self.entries
            .get_index_of(&(Rc::from(prefix), Rc::from(uri)))
            .map(|idx| NsId(idx as u32))
    }

    pub(crate) fn prefix(&self, id: NsId) -> &Rc<str> {
        &self.entries.get_index(id.index()).expect("namespace id").0 .0
    }

    pub(crate) fn uri(&self, id: NsId) -> &Rc<str> {
        &self.entries.get_index(id.index()).expect("namespace id").0 .1
    }

    pub(crate) fn handle(&self, id: NsId) -> Option<u64> {
        self.entries[id.index()].handle
    }

    /// Assigns the next definition handle. Must be called exactly once per
    /// namespace, at the moment its definition bytes are written.
    pub(crate) fn assign_handle(&mut self, id: NsId) -> u64 {
        debug_assert!(self.entries[id.index()].handle.is_none());
        self.defined += 1;
        self.entries[id.index()].handle = Some(self.defined);
        self.defined
    }

    pub(crate) fn activate(&mut self, id: NsId) {
        self.entries[id.index()].nesting += 1;
    }

    pub(crate) fn deactivate(&mut self, id: NsId) {
        let rec = &mut self.entries[id.index()];
        debug_assert!(rec.nesting > 0, "deactivate below zero");
        rec.nesting -= 1;
    }

    pub(crate) fn is_active(&self, id: NsId) -> bool {
        self.entries[id.index()].nesting > 0
    }

    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.seed();
    }
}

// ============================================================================
// Namespace table (reader side)
// ============================================================================

struct ReaderNs {
    prefix: Rc<str>,
    uri: Rc<str>,
    nesting: u32,
}

/// Reader-side namespace table. Position `h - 1` holds the namespace with
/// definition handle `h`; entries are appended in stream order only.
pub(crate) struct ReaderNamespaces {
    entries: Vec<ReaderNs>,
}

impl ReaderNamespaces {
    pub(crate) fn new() -> Self {
        let mut tbl = Self { entries: Vec::new() };
        tbl.seed();
        tbl
    }

    fn seed(&mut self) {
        self.entries.push(ReaderNs { prefix: Rc::from(""), uri: Rc::from(""), nesting: 1 });
        self.entries.push(ReaderNs {
            prefix: Rc::from(XML_PREFIX),
            uri: Rc::from(XML_NAMESPACE),
            nesting: 1,
        });
    }

    /// Appends a newly defined namespace and returns its id.
    pub(crate) fn define(&mut self, prefix: Rc<str>, uri: Rc<str>) -> NsId {
        let idx = self.entries.len();
        self.entries.push(ReaderNs { prefix, uri, nesting: 0 });
        NsId(idx as u32)
    }

    /// Resolves a 1-based definition handle.
    pub(crate) fn lookup(&self, handle: u64) -> Result<NsId> {
        if handle == 0 || handle > self.entries.len() as u64 {
            return Err(Error::HandleOutOfRange { handle, defined: self.entries.len() });
        }
        Ok(NsId((handle - 1) as u32))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn prefix(&self, id: NsId) -> &Rc<str> {
        &self.entries[id.index()].prefix
    }

    pub(crate) fn uri(&self, id: NsId) -> &Rc<str> {
        &self.entries[id.index()].uri
    }

    pub(crate) fn activate(&mut self, id: NsId) {
        self.entries[id.index()].nesting += 1;
    }

    pub(crate) fn deactivate(&mut self, id: NsId) {
        let rec = &mut self.entries[id.index()];
        debug_assert!(rec.nesting > 0, "deactivate below zero");
        rec.nesting -= 1;
    }

    pub(crate) fn is_active(&self, id: NsId) -> bool {
        self.entries[id.index()].nesting > 0
    }

    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.seed();
    }
}

// ============================================================================
// Name tables (writer side)
// ============================================================================

/// Index into a [`NameTable`]'s arena.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct NameId(u32);

struct NameRecord {
    ns: NsId,
    local: Rc<str>,
    handle: Option<u64>,
}

/// Two-level lookup: local name first, namespace only when the same local
/// name appears under more than one namespace.
///
/// Der häufige Fall — ein lokaler Name, ein Namespace — kommt so ohne
/// Hashing des (Namespace, Name)-Paares aus.
enum NameEntry {
    Single(u32),
    Multi(FastHashMap<NsId, u32>),
}

/// Writer-side name dictionary for one population (elements or attributes).
pub(crate) struct NameTable {
    map: FastHashMap<Rc<str>, NameEntry>,
    records: Vec<NameRecord>,
    handles: u64,
}

impl NameTable {
    pub(crate) fn new() -> Self {
        Self { map: FastHashMap::default(), records: Vec::new(), handles: 0 }
    }

    /// Resolves or creates the name for (ns, local).
    pub(crate) fn intern(&mut self, ns: NsId, local: &str) -> NameId {
        let next = self.records.len() as u32;
        if !self.map.contains_key(local) {
            let rc: Rc<str> = Rc::from(local);
            self.records.push(NameRecord { ns, local: Rc::clone(&rc), handle: None });
            self.map.insert(rc, NameEntry::Single(next));
            return NameId(next);
        }
        let entry = self.map.get_mut(local).expect("present, checked above");
        match entry {
            NameEntry::Single(idx) => {
                let idx = *idx;
                if self.records[idx as usize].ns == ns {
                    return NameId(idx);
                }
                // Zweiter Namespace für denselben lokalen Namen: auf
                // Sekundär-Map umstellen.
                let mut sub = FastHashMap::default();
                sub.insert(self.records[idx as usize].ns, idx);
                sub.insert(ns, next);
                let rc = Rc::clone(&self.records[idx as usize].local);
                self.records.push(NameRecord { ns, local: Rc::clone(&rc), handle: None });
                self.map.insert(rc, NameEntry::Multi(sub));
                NameId(next)
            }
            NameEntry::Multi(sub) => {
                if let Some(&idx) = sub.get(&ns) {
                    return NameId(idx);
                }
                sub.insert(ns, next);
                self.records.push(NameRecord { ns, local: Rc::from(local), handle: None });
                NameId(next)
            }
        }
    }

    pub(crate) fn handle(&self, id: NameId) -> Option<u64> {
        self.records[id.0 as usize].handle
    }

    /// Assigns the next sequential handle to a newly defined name.
    pub(crate) fn define(&mut self, id: NameId) -> u64 {
        debug_assert!(self.records[id.0 as usize].handle.is_none());
        self.handles += 1;
        self.records[id.0 as usize].handle = Some(self.handles);
        self.handles
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
        self.records.clear();
        self.handles = 0;
    }
}

// ============================================================================
// Shared-value tables
// ============================================================================

/// Writer-side shared-value dictionary (character runs or attribute values).
pub(crate) struct SharedValues {
    map: FastHashMap<Rc<str>, u64>,
    count: u64,
}

impl SharedValues {
    pub(crate) fn new() -> Self {
        Self { map: FastHashMap::default(), count: 0 }
    }

    pub(crate) fn lookup(&self, value: &str) -> Option<u64> {
        self.map.get(value).copied()
    }

    /// Inserts a first-occurrence value under the next 1-based handle.
    pub(crate) fn insert(&mut self, value: &str) -> u64 {
        self.count += 1;
        self.map.insert(Rc::from(value), self.count);
        self.count
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
        self.count = 0;
    }
}

/// Reader-side shared-value table: handle `h` lives at position `h - 1`.
pub(crate) struct ValueStore {
    entries: Vec<Rc<str>>,
}

impl ValueStore {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn define(&mut self, value: Rc<str>) {
        self.entries.push(value);
    }

    pub(crate) fn lookup(&self, handle: u64) -> Result<&Rc<str>> {
        if handle == 0 || handle > self.entries.len() as u64 {
            return Err(Error::HandleOutOfRange { handle, defined: self.entries.len() });
        }
        Ok(&self.entries[(handle - 1) as usize])
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Reader-side name dictionary: handle `h` lives at position `h - 1`.
pub(crate) struct NameStore {
    entries: Vec<Name>,
}

impl NameStore {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn define(&mut self, name: Name) -> &Name {
        self.entries.push(name);
        self.entries.last().expect("just pushed")
    }

    pub(crate) fn lookup(&self, handle: u64) -> Result<&Name> {
        if handle == 0 || handle > self.entries.len() as u64 {
            return Err(Error::HandleOutOfRange { handle, defined: self.entries.len() });
        }
        Ok(&self.entries[(handle - 1) as usize])
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
