//! Parser for WFS/O&M time-value-pair responses from the national
//! open-data endpoint.
//!
//! The endpoint emits the same schema with and without namespace
//! prefixes depending on environment, so every query is expressed as an
//! ordered list of candidate selectors (namespaced first, then bare) and
//! the first candidate with a non-empty match set wins. The fallback is
//! applied independently at each nesting level: member blocks, the
//! per-member measurement lists, and the time/value leaves.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::ParseError;
use crate::model::RawTimeSeriesPoint;

/// Quantity tokens matched as substrings of a member's
/// observed-property reference URI.
const TEMPERATURE_TOKEN: &str = "temperature";
const PRECIPITATION_TOKEN: &str = "precipitation1h";

const MEMBER_SELECTORS: &[&str] = &["wfs:member", "member"];
const OBSERVED_PROPERTY_SELECTORS: &[&str] = &["om:observedProperty", "observedProperty"];
const MEASUREMENT_SELECTORS: &[&str] = &["wml2:MeasurementTVP", "MeasurementTVP"];
const TIME_SELECTORS: &[&str] = &["wml2:time", "time"];
const VALUE_SELECTORS: &[&str] = &["wml2:value", "value"];

/// Per-quantity point lists extracted from one document, keyed by the
/// raw ISO-8601 timestamps, ready for alignment.
#[derive(Debug, Default)]
pub struct ParsedTimeSeries {
    pub temperature: Vec<RawTimeSeriesPoint>,
    pub precipitation: Vec<RawTimeSeriesPoint>,
}

/// Parse a raw WFS time-value-pair document into per-quantity point
/// lists. Pure: identical input yields identical output.
///
/// Members with an unrecognized observed property are skipped silently;
/// measurement pairs missing either leaf are skipped. Malformed XML or a
/// document with zero member blocks after both selector passes fails
/// with [`ParseError`].
pub fn parse_time_series(xml: &str) -> Result<ParsedTimeSeries, ParseError> {
    let root = build_tree(xml)?;

    let members = select(&root, MEMBER_SELECTORS);
    if members.is_empty() {
        return Err(ParseError::NoData);
    }

    let mut series = ParsedTimeSeries::default();

    for member in members {
        let href = select(member, OBSERVED_PROPERTY_SELECTORS)
            .first()
            .and_then(|el| el.attribute("xlink:href"))
            .unwrap_or("");

        let points = if href.contains(TEMPERATURE_TOKEN) {
            &mut series.temperature
        } else if href.contains(PRECIPITATION_TOKEN) {
            &mut series.precipitation
        } else {
            tracing::debug!(href, "skipping member with unrecognized observed property");
            continue;
        };

        for pair in select(member, MEASUREMENT_SELECTORS) {
            let time = select(pair, TIME_SELECTORS).first().map(|el| el.text.trim().to_string());
            let value = select(pair, VALUE_SELECTORS)
                .first()
                .and_then(|el| el.text.trim().parse::<f64>().ok());

            // A pair missing either leaf is skipped, not failed.
            if let (Some(time), Some(value)) = (time, value) {
                if !time.is_empty() {
                    points.push(RawTimeSeriesPoint { time, value });
                }
            }
        }
    }

    Ok(series)
}

/// A materialized element. The endpoint's documents are small (a few
/// hundred measurement pairs), and a tree keeps the selector fallback
/// queryable at every nesting level.
#[derive(Debug, Default)]
struct Element {
    /// Qualified name as serialized, e.g. `wml2:MeasurementTVP`.
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    /// Attribute lookup by qualified name, falling back to the local
    /// name so `xlink:href` also matches a bare `href`.
    fn attribute(&self, name: &str) -> Option<&str> {
        let local = local_name(name);
        self.attributes
            .iter()
            .find(|(key, _)| key == name || local_name(key) == local)
            .map(|(_, value)| value.as_str())
    }

    fn collect_descendants<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.name == name {
                out.push(child);
            }
            child.collect_descendants(name, out);
        }
    }
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Evaluate candidate selectors in order and return the first non-empty
/// match set over `scope`'s descendants.
fn select<'a>(scope: &'a Element, candidates: &[&str]) -> Vec<&'a Element> {
    for name in candidates {
        let mut found = Vec::new();
        scope.collect_descendants(name, &mut found);
        if !found.is_empty() {
            return found;
        }
    }
    Vec::new()
}

fn build_tree(xml: &str) -> Result<Element, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    // Synthetic root; the document element becomes its only child.
    let mut stack = vec![Element::default()];

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => stack.push(element_from(&start)?),
            Ok(Event::Empty(start)) => {
                let element = element_from(&start)?;
                push_child(&mut stack, element)?;
            }
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err(ParseError::Xml("unexpected closing tag".to_string()));
                }
                let element = stack.pop().unwrap_or_default();
                push_child(&mut stack, element)?;
            }
            Ok(Event::Text(text)) => {
                let text = text.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(text.trim());
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ParseError::Xml(e.to_string())),
        }
        buf.clear();
    }

    if stack.len() != 1 {
        return Err(ParseError::Xml("unclosed element at end of document".to_string()));
    }
    Ok(stack.pop().unwrap_or_default())
}

fn push_child(stack: &mut [Element], element: Element) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None => Err(ParseError::Xml("element outside of document".to_string())),
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<Element, ParseError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value =
            attr.unescape_value().map_err(|e| ParseError::Xml(e.to_string()))?.into_owned();
        attributes.push((key, value));
    }

    Ok(Element { name, attributes, text: String::new(), children: Vec::new() })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMESPACED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs/2.0">
  <wfs:member>
    <omso:PointTimeSeriesObservation>
      <om:observedProperty xlink:href="https://example.org/meta?param=temperature"/>
      <om:result>
        <wml2:MeasurementTimeseries>
          <wml2:point>
            <wml2:MeasurementTVP>
              <wml2:time>2026-08-27T10:00:00Z</wml2:time>
              <wml2:value>5.0</wml2:value>
            </wml2:MeasurementTVP>
          </wml2:point>
          <wml2:point>
            <wml2:MeasurementTVP>
              <wml2:time>2026-08-27T11:00:00Z</wml2:time>
              <wml2:value>6.5</wml2:value>
            </wml2:MeasurementTVP>
          </wml2:point>
        </wml2:MeasurementTimeseries>
      </om:result>
    </omso:PointTimeSeriesObservation>
  </wfs:member>
  <wfs:member>
    <omso:PointTimeSeriesObservation>
      <om:observedProperty xlink:href="https://example.org/meta?param=precipitation1h"/>
      <om:result>
        <wml2:MeasurementTimeseries>
          <wml2:point>
            <wml2:MeasurementTVP>
              <wml2:time>2026-08-27T10:00:00Z</wml2:time>
              <wml2:value>0.2</wml2:value>
            </wml2:MeasurementTVP>
          </wml2:point>
        </wml2:MeasurementTimeseries>
      </om:result>
    </omso:PointTimeSeriesObservation>
  </wfs:member>
</wfs:FeatureCollection>"#;

    const BARE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<FeatureCollection>
  <member>
    <PointTimeSeriesObservation>
      <observedProperty href="https://example.org/meta?param=temperature"/>
      <result>
        <MeasurementTimeseries>
          <point>
            <MeasurementTVP>
              <time>2026-08-27T10:00:00Z</time>
              <value>5.0</value>
            </MeasurementTVP>
          </point>
          <point>
            <MeasurementTVP>
              <time>2026-08-27T11:00:00Z</time>
              <value>6.5</value>
            </MeasurementTVP>
          </point>
        </MeasurementTimeseries>
      </result>
    </PointTimeSeriesObservation>
  </member>
  <member>
    <PointTimeSeriesObservation>
      <observedProperty href="https://example.org/meta?param=precipitation1h"/>
      <result>
        <MeasurementTimeseries>
          <point>
            <MeasurementTVP>
              <time>2026-08-27T10:00:00Z</time>
              <value>0.2</value>
            </MeasurementTVP>
          </point>
        </MeasurementTimeseries>
      </result>
    </PointTimeSeriesObservation>
  </member>
</FeatureCollection>"#;

    #[test]
    fn parses_namespaced_document() {
        let series = parse_time_series(NAMESPACED).unwrap();

        assert_eq!(series.temperature.len(), 2);
        assert_eq!(series.temperature[0].time, "2026-08-27T10:00:00Z");
        assert_eq!(series.temperature[0].value, 5.0);
        assert_eq!(series.temperature[1].value, 6.5);
        assert_eq!(series.precipitation.len(), 1);
        assert_eq!(series.precipitation[0].value, 0.2);
    }

    #[test]
    fn namespaced_and_bare_documents_parse_identically() {
        let namespaced = parse_time_series(NAMESPACED).unwrap();
        let bare = parse_time_series(BARE).unwrap();

        assert_eq!(namespaced.temperature, bare.temperature);
        assert_eq!(namespaced.precipitation, bare.precipitation);
    }

    #[test]
    fn unrecognized_member_is_skipped_silently() {
        let xml = r#"<FeatureCollection>
  <member>
    <observedProperty href="https://example.org/meta?param=windspeedms"/>
    <MeasurementTVP><time>2026-08-27T10:00:00Z</time><value>3.0</value></MeasurementTVP>
  </member>
  <member>
    <observedProperty href="https://example.org/meta?param=temperature"/>
    <MeasurementTVP><time>2026-08-27T10:00:00Z</time><value>7.0</value></MeasurementTVP>
  </member>
</FeatureCollection>"#;

        let series = parse_time_series(xml).unwrap();

        assert_eq!(series.temperature.len(), 1);
        assert_eq!(series.temperature[0].value, 7.0);
        assert!(series.precipitation.is_empty());
    }

    #[test]
    fn pair_missing_a_leaf_is_skipped() {
        let xml = r#"<FeatureCollection>
  <member>
    <observedProperty href="temperature"/>
    <MeasurementTVP><time>2026-08-27T10:00:00Z</time></MeasurementTVP>
    <MeasurementTVP><value>4.0</value></MeasurementTVP>
    <MeasurementTVP><time>2026-08-27T12:00:00Z</time><value>8.0</value></MeasurementTVP>
  </member>
</FeatureCollection>"#;

        let series = parse_time_series(xml).unwrap();

        assert_eq!(series.temperature.len(), 1);
        assert_eq!(series.temperature[0].time, "2026-08-27T12:00:00Z");
    }

    #[test]
    fn non_numeric_value_is_skipped() {
        let xml = r#"<FeatureCollection>
  <member>
    <observedProperty href="temperature"/>
    <MeasurementTVP><time>2026-08-27T10:00:00Z</time><value>NaN or so</value></MeasurementTVP>
  </member>
</FeatureCollection>"#;

        let series = parse_time_series(xml).unwrap();
        assert!(series.temperature.is_empty());
    }

    #[test]
    fn malformed_xml_is_a_parse_error() {
        let err = parse_time_series("<FeatureCollection><member></FeatureCollection>").unwrap_err();
        assert!(matches!(err, ParseError::Xml(_)));
    }

    #[test]
    fn document_without_members_is_no_data() {
        let err = parse_time_series("<ExceptionReport><text>oops</text></ExceptionReport>")
            .unwrap_err();
        assert!(matches!(err, ParseError::NoData));
        assert_eq!(err.to_string(), "no time-series data found");
    }

    #[test]
    fn member_with_empty_measurement_list_yields_empty_series() {
        let xml = r#"<FeatureCollection>
  <member>
    <observedProperty href="temperature"/>
  </member>
</FeatureCollection>"#;

        let series = parse_time_series(xml).unwrap();
        assert!(series.temperature.is_empty());
        assert!(series.precipitation.is_empty());
    }
}
