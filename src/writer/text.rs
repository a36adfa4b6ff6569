use csv::Writer;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::model::MapNode;

/// `x,y,value` 形式の CSV。GMT の xyz 入力としてもそのまま使える
#[derive(Default)]
pub struct TextWriter {}

impl TextWriter {
    pub fn new() -> Self {
        Self {}
    }

    pub fn write_map_nodes<W: Write>(&self, nodes: &[MapNode], out: W) -> Result<()> {
        let mut writer = Writer::from_writer(out);
        writer.write_record(["x", "y", "value"])?;
        for node in nodes {
            writer.write_record([
                node.lon.to_string(),
                node.lat.to_string(),
                node.value.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_map_nodes_file(&self, nodes: &[MapNode], output_path: &Path) -> Result<()> {
        tracing::info!(
            "Writing {} map nodes to {}",
            nodes.len(),
            output_path.display()
        );
        self.write_map_nodes(nodes, File::create(output_path)?)
    }
}
