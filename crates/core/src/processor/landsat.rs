//! Landsat science product generation.

use async_trait::async_trait;

use crate::command::args;

use super::{ProcessorError, SceneContext, SceneHandler};

/// Handler for the Landsat TM/ETM+/OLI-TIRS sensors.
///
/// The science tools share a command-line convention: every step takes the
/// internal metadata file via `--xml` and works in place in the work
/// directory.
pub struct LandsatHandler;

impl LandsatHandler {
    /// Locate the Level-1 MTL metadata file delivered with the scene.
    async fn find_mtl_filename(ctx: &SceneContext) -> Result<String, ProcessorError> {
        let mut entries = tokio::fs::read_dir(&ctx.work_dir).await?;
        let mut fallback = None;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.to_ascii_uppercase().ends_with("_MTL.TXT") {
                if name.starts_with(&ctx.product_id) {
                    return Ok(name);
                }
                fallback = Some(name);
            }
        }

        fallback.ok_or_else(|| {
            ProcessorError::MissingMetadata(format!(
                "no MTL metadata file found for [{}]",
                ctx.product_id
            ))
        })
    }
}

#[async_trait]
impl SceneHandler for LandsatHandler {
    async fn build_science_products(&self, ctx: &SceneContext) -> Result<(), ProcessorError> {
        let options = &ctx.options;

        // Convert the Level-1 (LPGS) data to the internal format.
        let mtl = Self::find_mtl_filename(ctx).await?;
        let mut cmd = args(["--mtl", mtl.as_str()]);
        if !options.include_source_data {
            cmd.push("--del_src_files".to_string());
        }
        ctx.run_tool("CONVERT LPGS TO ESPA", "convert_lpgs_to_espa", cmd)
            .await?;

        ctx.run_tool(
            "CLIP BAND MISALIGNMENT",
            "clip_band_misalignment",
            args(["--xml", ctx.xml_filename.as_str()]),
        )
        .await?;

        // Elevation feeds the water-extent and temperature algorithms.
        if options.include_dswe || options.include_st {
            ctx.run_tool(
                "ELEVATION",
                "build_elevation_band.py",
                args(["--xml", ctx.xml_filename.as_str()]),
            )
            .await?;
        }

        ctx.run_tool(
            "PIXEL QA",
            "generate_pixel_qa",
            args(["--xml", ctx.xml_filename.as_str()]),
        )
        .await?;

        // TOA and BT are always generated; the water detection step needs
        // them even when the user only ordered derived products.
        ctx.run_tool(
            "SURFACE REFLECTANCE",
            "surface_reflectance.py",
            args(["--xml", ctx.xml_filename.as_str()]),
        )
        .await?;

        ctx.run_tool(
            "CLOUD DILATION",
            "dilate_pixel_qa",
            args(["--xml", ctx.xml_filename.as_str(), "--bit", "5", "--distance", "3"]),
        )
        .await?;

        ctx.run_tool(
            "CFMASK WATER DETECTION",
            "cfmask_water_detection",
            args(["--xml", ctx.xml_filename.as_str()]),
        )
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

        if options.include_dswe {
            ctx.run_tool(
                "SURFACE WATER EXTENT",
                "surface_water_extent.py",
                args(["--xml", ctx.xml_filename.as_str(), "--verbose"]),
            )
            .await?;
        }

        if options.include_st {
            ctx.run_tool(
                "SURFACE TEMPERATURE",
                "surface_temperature.py",
                args(["--xml", ctx.xml_filename.as_str(), "--keep-intermediate-data"]),
            )
            .await?;
        }

        Ok(())
    }

    async fn cleanup_work_dir(&self, ctx: &SceneContext) -> Result<(), ProcessorError> {
        let options = &ctx.options;
        let mut patterns: Vec<&str> = Vec::new();

        // Intermediate non-products never ship.
        if !options.keep_intermediate_data {
            patterns.extend(["lndsr.*.txt", "lndcal.*.txt", "LogReport*", "*_elevation.*"]);
        }

        // Level-1 source files ship only when ordered.
        if !options.include_source_data {
            patterns.extend(["L*.TIF", "README.GTF", "*gap_mask*"]);
        }

        ctx.remove_matching(&patterns).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::testing::scene_fixture;
    use crate::request::OrderOptions;

    const PRODUCT_ID: &str = "LT05_L1TP_038038_19950624_20160302_01_T1";

    #[tokio::test]
    async fn test_minimal_sr_order_command_sequence() {
        let options = OrderOptions {
            include_sr: true,
            ..Default::default()
        };
        let fixture = scene_fixture(PRODUCT_ID, options).await;
        tokio::fs::write(
            fixture.work_dir().join(format!("{PRODUCT_ID}_MTL.txt")),
            b"mtl",
        )
        .await
        .unwrap();

        LandsatHandler
            .build_science_products(&fixture.context())
            .await
            .unwrap();

        let programs = fixture.recorded_programs().await;
        assert_eq!(
            programs,
            vec![
                "convert_lpgs_to_espa",
                "clip_band_misalignment",
                "generate_pixel_qa",
                "surface_reflectance.py",
                "dilate_pixel_qa",
                "cfmask_water_detection",
            ]
        );

        // Source data was not requested, so conversion deletes it.
        let commands = fixture.recorded().await;
        assert!(commands[0].args.contains(&"--del_src_files".to_string()));
    }

    #[tokio::test]
    async fn test_full_order_adds_optional_steps() {
        let options = OrderOptions {
            include_sr: true,
            include_sr_ndvi: true,
            include_sr_nbr: true,
            include_dswe: true,
            include_st: true,
            ..Default::default()
        };
        let fixture = scene_fixture(PRODUCT_ID, options).await;
        tokio::fs::write(
            fixture.work_dir().join(format!("{PRODUCT_ID}_MTL.txt")),
            b"mtl",
        )
        .await
        .unwrap();

        LandsatHandler
            .build_science_products(&fixture.context())
            .await
            .unwrap();

        let programs = fixture.recorded_programs().await;
        assert!(programs.contains(&"build_elevation_band.py".to_string()));
        assert!(programs.contains(&"spectral_indices.py".to_string()));
        assert!(programs.contains(&"surface_water_extent.py".to_string()));
        assert!(programs.contains(&"surface_temperature.py".to_string()));

        let commands = fixture.recorded().await;
        let indices = commands
            .iter()
            .find(|c| c.program == "spectral_indices.py")
            .unwrap();
        assert!(indices.args.contains(&"--ndvi".to_string()));
        assert!(indices.args.contains(&"--nbr".to_string()));
        assert!(!indices.args.contains(&"--evi".to_string()));
    }

    #[tokio::test]
    async fn test_missing_mtl_is_an_error() {
        let options = OrderOptions {
            include_sr: true,
            ..Default::default()
        };
        let fixture = scene_fixture(PRODUCT_ID, options).await;

        let err = LandsatHandler
            .build_science_products(&fixture.context())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::MissingMetadata(_)));
    }

    #[tokio::test]
    async fn test_cleanup_removes_intermediates_and_source() {
        let fixture = scene_fixture(PRODUCT_ID, OrderOptions::default()).await;
        for name in [
            "lndsr.LT05.txt",
            "LogReport_1",
            "band_elevation.img",
            "LT05_B1.TIF",
            "README.GTF",
            "keeper_sr_band1.img",
        ] {
            tokio::fs::write(fixture.work_dir().join(name), b"x").await.unwrap();
        }

        LandsatHandler
            .cleanup_work_dir(&fixture.context())
            .await
            .unwrap();

        assert!(!fixture.work_dir().join("lndsr.LT05.txt").exists());
        assert!(!fixture.work_dir().join("LogReport_1").exists());
        assert!(!fixture.work_dir().join("band_elevation.img").exists());
        assert!(!fixture.work_dir().join("LT05_B1.TIF").exists());
        assert!(!fixture.work_dir().join("README.GTF").exists());
        assert!(fixture.work_dir().join("keeper_sr_band1.img").exists());
    }

    #[tokio::test]
    async fn test_cleanup_honors_keep_flags() {
        let options = OrderOptions {
            keep_intermediate_data: true,
            include_source_data: true,
            ..Default::default()
        };
        let fixture = scene_fixture(PRODUCT_ID, options).await;
        tokio::fs::write(fixture.work_dir().join("lndsr.LT05.txt"), b"x").await.unwrap();
        tokio::fs::write(fixture.work_dir().join("LT05_B1.TIF"), b"x").await.unwrap();

        LandsatHandler
            .cleanup_work_dir(&fixture.context())
            .await
            .unwrap();

        assert!(fixture.work_dir().join("lndsr.LT05.txt").exists());
        assert!(fixture.work_dir().join("LT05_B1.TIF").exists());
    }
}
