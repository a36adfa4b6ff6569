use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{NrmlError, Result};
use crate::exposure::ExposurePortfolio;
use crate::model::{ExposureAsset, ExposureMetadata};
use crate::parser::{GML_NS, NRML_NS};

/// NRML 0.3 の `exposureModel` 文書を書く
#[derive(Default)]
pub struct ExposureWriter {}

impl ExposureWriter {
    pub fn new() -> Self {
        Self {}
    }

    /// 必須項目（`assetCategory`、各資産の経緯度とタクソノミー）が欠けていれば
    /// 何も書かずにエラーを返す
    pub fn write<W: Write>(&self, out: W, portfolio: &ExposurePortfolio) -> Result<()> {
        validate(portfolio)?;

        let mut writer = Writer::new_with_indent(out, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("nrml");
        root.push_attribute(("xmlns", NRML_NS));
        root.push_attribute(("xmlns:gml", GML_NS));
        root.push_attribute(("gml:id", "n1"));
        writer.write_event(Event::Start(root))?;

        let mut model = BytesStart::new("exposureModel");
        model.push_attribute(("gml:id", portfolio.model_id.as_str()));
        writer.write_event(Event::Start(model))?;
        writer.write_event(Event::Empty(BytesStart::new("config")))?;

        writer.write_event(Event::Start(exposure_list(&portfolio.metadata)))?;
        if let Some(description) = &portfolio.metadata.description {
            text_element(&mut writer, "gml:description", &[], description)?;
        }
        if let Some(source) = &portfolio.metadata.taxonomy_source {
            text_element(&mut writer, "taxonomySource", &[], source)?;
        }

        for (i, asset) in portfolio.assets.iter().enumerate() {
            write_asset(&mut writer, i + 1, asset)?;
        }

        writer.write_event(Event::End(BytesEnd::new("exposureList")))?;
        writer.write_event(Event::End(BytesEnd::new("exposureModel")))?;
        writer.write_event(Event::End(BytesEnd::new("nrml")))?;

        let mut out = writer.into_inner();
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }

    pub fn write_file(&self, portfolio: &ExposurePortfolio, output_path: &Path) -> Result<()> {
        validate(portfolio)?;
        tracing::info!(
            "Writing {} assets to {}",
            portfolio.assets.len(),
            output_path.display()
        );
        self.write(BufWriter::new(File::create(output_path)?), portfolio)
    }
}

fn validate(portfolio: &ExposurePortfolio) -> Result<()> {
    if portfolio.metadata.asset_category.is_none() {
        return Err(NrmlError::MissingField("assetCategory".to_string()));
    }
    for (i, asset) in portfolio.assets.iter().enumerate() {
        if asset.lon.is_none() || asset.lat.is_none() {
            return Err(NrmlError::MissingField(format!(
                "lon and lat of asset_{}",
                i + 1
            )));
        }
        if asset.taxonomy.is_none() {
            return Err(NrmlError::MissingField(format!("taxonomy of asset_{}", i + 1)));
        }
    }
    Ok(())
}

fn exposure_list(metadata: &ExposureMetadata) -> BytesStart<'_> {
    let mut list = BytesStart::new("exposureList");
    list.push_attribute(("gml:id", metadata.exposure_list_id.as_str()));

    let optional = [
        ("assetCategory", &metadata.asset_category),
        ("areaType", &metadata.area_type),
        ("areaUnit", &metadata.area_unit),
        ("cocoType", &metadata.coco_type),
        ("cocoUnit", &metadata.coco_unit),
        ("recoType", &metadata.reco_type),
        ("recoUnit", &metadata.reco_unit),
        ("stcoType", &metadata.stco_type),
        ("stcoUnit", &metadata.stco_unit),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            list.push_attribute((name, value.as_str()));
        }
    }
    list
}

fn write_asset<W: Write>(
    writer: &mut Writer<W>,
    index: usize,
    asset: &ExposureAsset,
) -> Result<()> {
    let id = format!("asset_{}", index);
    let mut definition = BytesStart::new("assetDefinition");
    definition.push_attribute(("gml:id", id.as_str()));
    writer.write_event(Event::Start(definition))?;

    let lon = asset.lon.as_deref().unwrap_or_default();
    let lat = asset.lat.as_deref().unwrap_or_default();
    writer.write_event(Event::Start(BytesStart::new("site")))?;
    let mut point = BytesStart::new("gml:Point");
    point.push_attribute(("srsName", "epsg:4326"));
    writer.write_event(Event::Start(point))?;
    text_element(writer, "gml:pos", &[], &format!("{} {}", lon, lat))?;
    writer.write_event(Event::End(BytesEnd::new("gml:Point")))?;
    writer.write_event(Event::End(BytesEnd::new("site")))?;

    // 要素の順序は NRML 0.3 のスキーマに合わせる
    let fields: [(&str, &[(&str, &str)], &Option<String>); 10] = [
        ("area", &[], &asset.area),
        ("coco", &[], &asset.coco),
        ("deductible", &[], &asset.deductible),
        ("limit", &[], &asset.limit),
        ("number", &[], &asset.number),
        ("occupants", &[("description", "day")], &asset.occupants_day),
        ("occupants", &[("description", "night")], &asset.occupants_night),
        ("reco", &[], &asset.reco),
        ("stco", &[], &asset.stco),
        ("taxonomy", &[], &asset.taxonomy),
    ];
    for (name, attributes, value) in fields {
        if let Some(value) = value {
            text_element(writer, name, attributes, value)?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("assetDefinition")))?;
    Ok(())
}

fn text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    attributes: &[(&str, &str)],
    text: &str,
) -> Result<()> {
    let mut start = BytesStart::new(name);
    for &attribute in attributes {
        start.push_attribute(attribute);
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
