//! Output format conversion.
//!
//! Science processing produces the internal ENVI format; the external
//! converters reformat to what the user ordered. Each converter renames
//! the metadata file, which is renamed back so downstream steps keep a
//! stable name.

use std::path::Path;

use crate::command::{args, CommandRunner};
use crate::joblog::JobLogHandle;
use crate::request::OutputFormat;

use super::ProcessorError;

pub async fn reformat(
    runner: &dyn CommandRunner,
    joblog: &JobLogHandle,
    work_dir: &Path,
    metadata_filename: &str,
    output_format: OutputFormat,
) -> Result<(), ProcessorError> {
    // Science output already is the internal format.
    if output_format == OutputFormat::Envi {
        return Ok(());
    }

    let base = metadata_filename.trim_end_matches(".xml");

    let (label, program, target_flag, target_name, renamed_metadata) = match output_format {
        OutputFormat::Gtiff => (
            "CONVERT ESPA TO GTIF",
            "convert_espa_to_gtif",
            "--gtif",
            base.to_string(),
            format!("{base}_gtif.xml"),
        ),
        OutputFormat::HdfEos2 => (
            "CONVERT ESPA TO HDF",
            "convert_espa_to_hdf",
            "--hdf",
            format!("{base}.hdf"),
            format!("{base}_hdf.xml"),
        ),
        OutputFormat::Netcdf => (
            "CONVERT ESPA TO NETCDF",
            "convert_espa_to_netcdf",
            "--netcdf",
            format!("{base}.nc"),
            format!("{base}_nc.xml"),
        ),
        OutputFormat::Envi => unreachable!(),
    };

    let command_args = args([
        "--del_src_files",
        "--xml",
        metadata_filename,
        target_flag,
        target_name.as_str(),
    ]);

    joblog
        .info(format!("{label} COMMAND: {program} {}", command_args.join(" ")))
        .await;
    let output = runner.run(program, &command_args, Some(work_dir)).await?;
    if !output.is_empty() {
        joblog.info(output).await;
    }

    // Rename the metadata file back to its original name.
    let renamed = work_dir.join(&renamed_metadata);
    if renamed.exists() {
        tokio::fs::rename(renamed, work_dir.join(metadata_filename)).await?;
    }

    if output_format == OutputFormat::Gtiff {
        remove_world_files(work_dir).await?;
    }

    Ok(())
}

/// GeoTIFF conversion leaves `.tfw` world files behind; they are not part
/// of the delivered product.
async fn remove_world_files(work_dir: &Path) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().ends_with(".tfw") {
            tokio::fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}
