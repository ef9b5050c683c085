/// Small element tree read with quick-xml's event reader.
///
/// Used for the flat documents the player exchanges: SOAP envelopes, the
/// activation message and the settings file. Names are local, namespace
/// prefixes are dropped.
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    /// Text and CDATA directly inside this element, trimmed.
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// `(name, text)` of each direct child, in document order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.children
            .iter()
            .map(|c| (c.name.as_str(), c.text.as_str()))
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Top-level elements of `xml`, in document order. More than one is allowed.
pub fn parse_elements(xml: &str) -> Result<Vec<Element>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut open: Vec<Element> = Vec::new();
    let mut top = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("XML error at {}: {e}", reader.buffer_position()))?;

        match event {
            Event::Start(e) => open.push(element(&e)?),
            Event::Empty(e) => {
                let done = element(&e)?;
                attach(&mut open, &mut top, done);
            }
            Event::Text(t) => {
                if let Some(current) = open.last_mut() {
                    current
                        .text
                        .push_str(&t.unescape().map_err(|e| e.to_string())?);
                }
            }
            Event::CData(c) => {
                if let Some(current) = open.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) => {
                let done = open
                    .pop()
                    .ok_or_else(|| "closing tag without an open element".to_string())?;
                attach(&mut open, &mut top, done);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !open.is_empty() {
        return Err("truncated document".to_string());
    }
    Ok(top)
}

fn attach(open: &mut [Element], top: &mut Vec<Element>, done: Element) {
    match open.last_mut() {
        Some(parent) => parent.children.push(done),
        None => top.push(done),
    }
}

fn element(e: &BytesStart<'_>) -> Result<Element, String> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        attrs.push((key, value.into_owned()));
    }

    Ok(Element {
        name,
        attrs,
        ..Element::default()
    })
}
