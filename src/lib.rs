//! xbis – XML Binary Information Set (XBIS) codec.
//!
//! A compact, self-describing binary representation of XML documents:
//! elements, attributes, namespaces, and recurring text values are
//! handle-compressed against dictionaries built on the fly by both sides of
//! the stream. The writer consumes XML parse events and emits XBIS bytes;
//! the reader turns XBIS bytes back into the same event stream.
//!
//! # Beispiel
//!
//! ```
//! use xbis::{XbisEvent, encode, decode};
//!
//! let events = vec![
//!     XbisEvent::StartDocument,
//!     XbisEvent::start_local("greeting"),
//!     XbisEvent::Text("Hello".into()),
//!     XbisEvent::EndElement,
//!     XbisEvent::EndDocument,
//! ];
//! let bytes = encode(&events).unwrap();
//! let decoded = decode(&bytes).unwrap();
//! assert_eq!(decoded, events);
//! ```

mod buffer;
pub mod error;
pub mod event;
pub mod header;
pub mod node;
pub mod qname;
pub mod reader;
mod tables;
mod value;
pub mod writer;
pub mod xml;
pub mod xml_serializer;

pub use error::{Error, Result};

/// HashMap mit ahash (schneller, nicht DoS-resistent — für interne
/// Datenstrukturen). Nutzt hashbrown direkt.
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

// Public API: Events
pub use event::XbisEvent;

// Public API: Header
pub use header::StreamHeader;

// Public API: Names
pub use qname::{Name, NsId, XML_NAMESPACE, XML_PREFIX};

// Public API: Writer/Reader
pub use reader::{decode, EventReader, Token};
pub use writer::{encode, encode_with_config, EventWriter, PushWriter, WriterConfig};

// Public API: XML adapters
pub use xml::{encode_xml_reader, encode_xml_str, parse_xml_events};
pub use xml_serializer::{decode_to_xml, events_to_xml};
