//! MODIS science product generation.

use async_trait::async_trait;

use crate::command::args;

use super::{ProcessorError, SceneContext, SceneHandler};

/// Handler for the Terra/Aqua MODIS products.
///
/// MODIS inputs arrive already gridded; processing converts the HDF tile
/// to the internal format and derives the requested indices from it.
pub struct ModisHandler;

#[async_trait]
impl SceneHandler for ModisHandler {
    async fn build_science_products(&self, ctx: &SceneContext) -> Result<(), ProcessorError> {
        let options = &ctx.options;

        let hdf_filename = format!("{}.hdf", ctx.product_id);
        let mut cmd = args(["--hdf", hdf_filename.as_str()]);
        if !options.include_source_data {
            cmd.push("--del_src_files".to_string());
        }
        ctx.run_tool("CONVERT MODIS TO ESPA", "convert_modis_to_espa", cmd)
            .await?;

        if options.wants_spectral_indices() {
            let mut cmd = args(["--xml", ctx.xml_filename.as_str()]);
            if options.include_sr_nbr {
                cmd.push("--nbr".to_string());
            }
            if options.include_sr_nbr2 {
                cmd.push("--nbr2".to_string());
            }
            if options.include_sr_ndvi {
                cmd.push("--ndvi".to_string());
            }
            if options.include_sr_ndmi {
                cmd.push("--ndmi".to_string());
            }
            if options.include_sr_savi {
                cmd.push("--savi".to_string());
            }
            if options.include_sr_msavi {
                cmd.push("--msavi".to_string());
            }
            if options.include_sr_evi {
                cmd.push("--evi".to_string());
            }
            ctx.run_tool("SPECTRAL INDICES", "spectral_indices.py", cmd)
                .await?;
        }

        Ok(())
    }

    async fn cleanup_work_dir(&self, ctx: &SceneContext) -> Result<(), ProcessorError> {
        // The source tile ships only when ordered; conversion keeps it on
        // disk so the removal happens here.
        if !ctx.options.include_source_data {
            ctx.remove_matching(&["*.hdf"]).await?;
        }
        Ok(())
    }
}
