//! NRML 0.3 の XML ストリームパーサ群。
//!
//! 各パーサは `BufRead` を受け取り、要素のローカル名で照合する。NRML と GML の
//! 名前空間で、ここで扱うローカル名が衝突することはない。

mod curves;
mod hazard_map;
mod loss_map;
mod rupture_model;
mod source_model;

pub use curves::{parse_hazard_curves, parse_loss_curves};
pub use hazard_map::parse_hazard_map;
pub use loss_map::parse_loss_map;
pub use rupture_model::parse_rupture_model;
pub use source_model::parse_source_model;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;

use crate::error::{NrmlError, Result};
use crate::geodesy::Location;

pub const NRML_NS: &str = "http://openquake.org/xmlns/nrml/0.3";
pub const GML_NS: &str = "http://www.opengis.net/gml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NrmlKind {
    HazardMap,
    HazardCurves,
    LossMap,
    LossCurves,
    SourceModel,
    RuptureModel,
    ExposureModel,
}

impl NrmlKind {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"hazardMap" | b"HMNode" => Some(NrmlKind::HazardMap),
            b"hazardCurveField" | b"HCNode" => Some(NrmlKind::HazardCurves),
            b"lossMap" | b"LMNode" => Some(NrmlKind::LossMap),
            b"lossCurveList" | b"LCNode" | b"lossCurve" | b"lossRatioCurve" => {
                Some(NrmlKind::LossCurves)
            }
            b"sourceModel" => Some(NrmlKind::SourceModel),
            b"ruptureModel" | b"simpleFaultRupture" => Some(NrmlKind::RuptureModel),
            b"exposureModel" => Some(NrmlKind::ExposureModel),
            _ => None,
        }
    }
}

/// 最初に現れる特徴的な要素から文書の種類を判定する
pub fn detect_kind<R: BufRead>(reader: R) -> Result<Option<NrmlKind>> {
    let mut reader = Reader::from_reader(reader);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                if let Some(kind) = NrmlKind::from_local_name(e.local_name().as_ref()) {
                    return Ok(Some(kind));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

/// ストリーム中の1要素。`Close` の時点で直下のテキストが揃っている
#[derive(Debug, Default)]
pub(crate) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            text: String::new(),
        })
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `gml:id`
    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    pub fn number(&self) -> Result<f64> {
        parse_number(&self.name, &self.text)
    }

    pub fn numbers(&self) -> Result<Vec<f64>> {
        parse_numbers(&self.name, &self.text)
    }

    pub fn attribute_number(&self, key: &str) -> Result<f64> {
        let value = self
            .attribute(key)
            .ok_or_else(|| NrmlError::MissingField(format!("{}@{}", self.name, key)))?;
        parse_number(&format!("{}@{}", self.name, key), value)
    }
}

pub(crate) enum Visit<'a> {
    Open(&'a Element),
    Close(&'a Element),
}

/// 要素の開始と終了をコールバックに渡しながら文書全体を走査する
pub(crate) fn walk<R, F>(reader: R, mut visit: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(Visit<'_>) -> Result<()>,
{
    let mut reader = Reader::from_reader(reader);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let element = Element::from_start(&e)?;
                visit(Visit::Open(&element))?;
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = Element::from_start(&e)?;
                visit(Visit::Open(&element))?;
                visit(Visit::Close(&element))?;
            }
            Event::Text(t) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(t) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    visit(Visit::Close(&element))?;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

pub(crate) fn parse_number(element: &str, text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| NrmlError::InvalidNumber {
            element: element.to_string(),
            value: text.to_string(),
        })
}

pub(crate) fn parse_numbers(element: &str, text: &str) -> Result<Vec<f64>> {
    text.split_whitespace()
        .map(|token| parse_number(element, token))
        .collect()
}

/// `gml:pos` の "lon lat" を読む。3番目以降の値は無視する
pub(crate) fn parse_pos(text: &str) -> Result<(f64, f64)> {
    let values = parse_numbers("pos", text)?;
    match values.as_slice() {
        [lon, lat, ..] => Ok((*lon, *lat)),
        _ => Err(NrmlError::InvalidGeometry(format!(
            "gml:pos needs longitude and latitude, got {:?}",
            text
        ))),
    }
}

/// 2次元の `gml:posList`
pub(crate) fn parse_pos_list_2d(text: &str) -> Result<Vec<(f64, f64)>> {
    let values = parse_numbers("posList", text)?;
    if values.is_empty() || values.len() % 2 != 0 {
        return Err(NrmlError::InvalidGeometry(format!(
            "2D posList must hold lon/lat pairs, got {} values",
            values.len()
        )));
    }
    Ok(values.chunks_exact(2).map(|c| (c[0], c[1])).collect())
}

/// 3次元の `gml:posList`（lon lat depth）
pub(crate) fn parse_pos_list_3d(text: &str) -> Result<Vec<Location>> {
    let values = parse_numbers("posList", text)?;
    if values.is_empty() || values.len() % 3 != 0 {
        return Err(NrmlError::InvalidGeometry(format!(
            "3D posList must hold lon/lat/depth triples, got {} values",
            values.len()
        )));
    }
    Ok(values
        .chunks_exact(3)
        .map(|c| Location::new(c[0], c[1], c[2]))
        .collect())
}

/// 先頭と末尾が一致しなければ先頭頂点を追加してリングを閉じる
pub(crate) fn close_ring(mut ring: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if first != last {
            ring.push(first);
        }
    }
    ring
}
