//! XML text round trips through the binary form.
//!
//! Kommentare und PIs überleben den Trip nicht (der Reader überspringt sie);
//! die Vergleichsdokumente enthalten deshalb nur Strukturen mit
//! XBIS-Entsprechung auf beiden Seiten.

use xbis::xml::encode_xml_str;
use xbis::xml_serializer::decode_to_xml;

const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

fn xml_round_trip(xml: &str) -> String {
    let bytes = encode_xml_str(xml).expect("encode");
    decode_to_xml(&bytes).expect("decode")
}

#[test]
fn simple_document() {
    let out = xml_round_trip("<doc><item>text</item><item>text</item></doc>");
    assert_eq!(out, format!("{XML_DECL}<doc><item>text</item><item>text</item></doc>"));
}

#[test]
fn attributes_preserved_in_order() {
    let out = xml_round_trip(r#"<e b="2" a="1"/>"#);
    assert_eq!(out, format!(r#"{XML_DECL}<e b="2" a="1"/>"#));
}

#[test]
fn namespaces_reconstructed() {
    let out = xml_round_trip(r#"<p:e xmlns:p="urn:x"><p:c/></p:e>"#);
    assert_eq!(out, format!(r#"{XML_DECL}<p:e xmlns:p="urn:x"><p:c/></p:e>"#));
}

#[test]
fn default_namespace_reconstructed() {
    let out = xml_round_trip(r#"<e xmlns="urn:d"><c/></e>"#);
    assert_eq!(out, format!(r#"{XML_DECL}<e xmlns="urn:d"><c/></e>"#));
}

#[test]
fn cdata_preserved() {
    let out = xml_round_trip("<d><![CDATA[1 < 2 & 3]]></d>");
    assert_eq!(out, format!("{XML_DECL}<d><![CDATA[1 < 2 & 3]]></d>"));
}

#[test]
fn escaped_content_survives() {
    let out = xml_round_trip(r#"<d a="x&amp;y">1 &lt; 2</d>"#);
    assert_eq!(out, format!(r#"{XML_DECL}<d a="x&amp;y">1 &lt; 2</d>"#));
}

#[test]
fn repeated_values_share_and_reconstruct() {
    let xml = r#"<r><c x="LONGVALUE"/><c x="LONGVALUE"/><c x="LONGVALUE"/></r>"#;
    let bytes = encode_xml_str(xml).unwrap();
    let occurrences = bytes.windows(9).filter(|w| *w == b"LONGVALUE").count();
    assert_eq!(occurrences, 1);
    let out = decode_to_xml(&bytes).unwrap();
    assert_eq!(out, format!("{XML_DECL}{xml}"));
}

#[test]
fn binary_form_is_smaller_for_repetitive_documents() {
    let mut xml = String::from("<records>");
    for i in 0..200 {
        xml.push_str(&format!(
            r#"<record category="shared-category-name" status="active-and-verified">entry {i}</record>"#
        ));
    }
    xml.push_str("</records>");
    let bytes = encode_xml_str(&xml).unwrap();
    assert!(
        bytes.len() < xml.len() / 2,
        "expected compression, got {} of {}",
        bytes.len(),
        xml.len()
    );
    let out = decode_to_xml(&bytes).unwrap();
    assert_eq!(out, format!("{XML_DECL}{xml}"));
}

#[test]
fn mixed_content_round_trip() {
    let xml = "<p>before<b>bold</b>after</p>";
    let out = xml_round_trip(xml);
    assert_eq!(out, format!("{XML_DECL}{xml}"));
}

#[test]
fn unicode_round_trip() {
    let xml = "<grüße sprache=\"dé\">杂志 🎈</grüße>";
    let out = xml_round_trip(xml);
    assert_eq!(out, format!("{XML_DECL}{xml}"));
}
