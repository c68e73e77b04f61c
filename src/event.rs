//! XML parse event model.
//!
//! The writer consumes this stream shape and the batch decode API produces
//! it. Attribute events follow their element's start event directly;
//! namespace declarations precede the element start they scope to.

use std::rc::Rc;

/// One XML parse event.
///
/// String-Payloads sind `Rc<str>`: der Codec ist single-threaded und Werte
/// wandern zwischen Tabellen und Events ohne Kopie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XbisEvent {
    /// Beginning of the document.
    StartDocument,
    /// End of the document.
    EndDocument,
    /// Element start tag.
    StartElement { prefix: Rc<str>, uri: Rc<str>, local: Rc<str> },
    /// Close of the current element.
    EndElement,
    /// One attribute of the immediately preceding start tag.
    Attribute { prefix: Rc<str>, uri: Rc<str>, local: Rc<str>, value: Rc<str> },
    /// Character data.
    Text(Rc<str>),
    /// CDATA section content.
    Cdata(Rc<str>),
    /// Comment text. Encoded but skipped by the reader.
    Comment(Rc<str>),
    /// Processing instruction. Encoded but skipped by the reader.
    ProcessingInstruction { target: Rc<str>, data: Rc<str> },
    /// Namespace mapping scoped to the next element start.
    NamespaceDeclaration { prefix: Rc<str>, uri: Rc<str> },
    /// Document type declaration. Encoded but skipped by the reader.
    DocType { name: Rc<str>, public_id: Rc<str>, system_id: Rc<str> },
    /// Notation declaration. Encoded but skipped by the reader.
    Notation { name: Rc<str>, public_id: Rc<str>, system_id: Rc<str> },
    /// Unparsed entity declaration. Encoded but skipped by the reader.
    UnparsedEntity { name: Rc<str>, public_id: Rc<str>, system_id: Rc<str>, notation: Rc<str> },
    /// Skipped entity notification. Encoded but skipped by the reader.
    SkippedEntity(Rc<str>),
    /// DTD element declaration. Encoded but skipped by the reader.
    ElementDecl { name: Rc<str>, model: Rc<str> },
    /// DTD attribute declaration. Encoded but skipped by the reader.
    AttributeDecl {
        element: Rc<str>,
        attribute: Rc<str>,
        attr_type: Rc<str>,
        default_type: Rc<str>,
        default_value: Rc<str>,
    },
    /// External entity declaration. Encoded but skipped by the reader.
    ExternalEntityDecl { name: Rc<str>, public_id: Rc<str>, system_id: Rc<str> },
}

impl XbisEvent {
    /// Convenience constructor for an element start in no namespace.
    pub fn start_local(local: &str) -> Self {
        Self::StartElement { prefix: Rc::from(""), uri: Rc::from(""), local: Rc::from(local) }
    }

    /// Convenience constructor for an attribute in no namespace.
    pub fn attribute_local(local: &str, value: &str) -> Self {
        Self::Attribute {
            prefix: Rc::from(""),
            uri: Rc::from(""),
            local: Rc::from(local),
            value: Rc::from(value),
        }
    }

    /// True for the event kinds the pull reader reports; the remaining kinds
    /// are carried in the stream but consumed silently.
    pub fn is_principal(&self) -> bool {
        matches!(
            self,
            Self::StartDocument
                | Self::EndDocument
                | Self::StartElement { .. }
                | Self::EndElement
                | Self::Attribute { .. }
                | Self::Text(_)
                | Self::Cdata(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_local_has_empty_namespace() {
        let e = XbisEvent::start_local("doc");
        match e {
            XbisEvent::StartElement { prefix, uri, local } => {
                assert_eq!(&*prefix, "");
                assert_eq!(&*uri, "");
                assert_eq!(&*local, "doc");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn principal_classification() {
        assert!(XbisEvent::StartDocument.is_principal());
        assert!(XbisEvent::Text(Rc::from("x")).is_principal());
        assert!(!XbisEvent::Comment(Rc::from("x")).is_principal());
        assert!(!XbisEvent::SkippedEntity(Rc::from("e")).is_principal());
    }
}
