use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use reviewdoc::config::Config;
use reviewdoc::media::extract_references_from_text;
use reviewdoc::reconcile::orphans;
use reviewdoc::richtext::ReviewFormat;
use reviewdoc::upload::{ImageUpload, LocalUploadStore, Owner, OwnerType, UploadService};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "reviewdoc")]
#[command(about = "Review documents with embedded images", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a review between html and markdown
    Convert {
        /// Review file, or - for stdin
        input: PathBuf,
        /// Format of the input (guessed from the extension if omitted)
        #[arg(long, value_enum)]
        from: Option<ReviewFormat>,
        /// Format to write
        #[arg(long, value_enum)]
        to: ReviewFormat,
        /// Write here instead of stdout; a path without an extension gets
        /// the one for the output format
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the media ids a review references
    Refs {
        /// Review file, or - for stdin
        input: PathBuf,
        #[arg(long, value_enum)]
        format: Option<ReviewFormat>,
    },
    /// Print media referenced by an old version of a review but not the new one
    Orphans {
        old: PathBuf,
        new: PathBuf,
        #[arg(long, value_enum)]
        format: Option<ReviewFormat>,
    },
    /// Store an image in the local upload directory and print its url
    Upload {
        file: PathBuf,
        #[arg(long, value_enum)]
        owner_type: OwnerType,
        #[arg(long)]
        owner_id: u64,
        /// MIME type (guessed from the extension if omitted)
        #[arg(long)]
        mime: Option<String>,
    },
    /// Delete images from the local upload directory
    Delete {
        #[arg(required = true)]
        media_ids: Vec<String>,
    },
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Explicit format, else the file extension, else the configured default
fn resolve_format(explicit: Option<ReviewFormat>, path: &Path, config: &Config) -> ReviewFormat {
    explicit
        .or_else(|| ReviewFormat::from_path(path))
        .unwrap_or(config.format)
}

fn guess_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        _ => return None,
    })
}

fn upload_store(config: &Config) -> LocalUploadStore {
    LocalUploadStore::new(&config.upload_dir, config.public_base_url.clone())
        .with_max_bytes(config.max_upload_bytes)
}

fn cmd_convert(
    input: &Path,
    from: Option<ReviewFormat>,
    to: ReviewFormat,
    output: Option<&Path>,
    config: &Config,
) -> Result<()> {
    let text = read_input(input)?;
    let from = resolve_format(from, input, config);
    let document = from.deserialize(&text);
    let mut converted = to.serialize(&document);
    if !converted.ends_with('\n') {
        converted.push('\n');
    }

    match output {
        Some(path) => {
            let path = output_path(path, to);
            fs::write(&path, converted)
                .with_context(|| format!("Failed to write {}", path.display()))?
        }
        None => io::stdout().write_all(converted.as_bytes())?,
    }
    Ok(())
}

fn output_path(path: &Path, format: ReviewFormat) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(format.extension())
    }
}

fn cmd_refs(input: &Path, format: Option<ReviewFormat>, config: &Config) -> Result<()> {
    let text = read_input(input)?;
    let format = resolve_format(format, input, config);
    for id in extract_references_from_text(format, &text) {
        println!("{id}");
    }
    Ok(())
}

fn cmd_orphans(old: &Path, new: &Path, format: Option<ReviewFormat>, config: &Config) -> Result<()> {
    let known = extract_references_from_text(
        resolve_format(format, old, config),
        &read_input(old)?,
    );
    let current = extract_references_from_text(
        resolve_format(format, new, config),
        &read_input(new)?,
    );
    for id in orphans(&known, &current) {
        println!("{id}");
    }
    Ok(())
}

async fn cmd_upload(file: &Path, owner: Owner, mime: Option<String>, config: &Config) -> Result<()> {
    let mime = match mime.or_else(|| guess_mime(file).map(str::to_string)) {
        Some(mime) => mime,
        None => bail!("Cannot tell the image type of {}, pass --mime", file.display()),
    };
    let bytes = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let mut upload = ImageUpload::new(bytes, mime);
    if let Some(name) = file.file_name().and_then(|n| n.to_str()) {
        upload = upload.with_file_name(name);
    }

    let uploaded = upload_store(config).upload(upload, &owner).await?;
    println!("{}", uploaded.url);
    Ok(())
}

async fn cmd_delete(media_ids: &[String], config: &Config) -> Result<()> {
    let store = upload_store(config);
    for id in media_ids {
        store
            .delete(id)
            .await
            .with_context(|| format!("Failed to delete {id}"))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::load()?;

    match args.command {
        Commands::Convert {
            input,
            from,
            to,
            output,
        } => cmd_convert(&input, from, to, output.as_deref(), &config),
        Commands::Refs { input, format } => cmd_refs(&input, format, &config),
        Commands::Orphans { old, new, format } => cmd_orphans(&old, &new, format, &config),
        Commands::Upload {
            file,
            owner_type,
            owner_id,
            mime,
        } => cmd_upload(&file, Owner::new(owner_type, owner_id), mime, &config).await,
        Commands::Delete { media_ids } => cmd_delete(&media_ids, &config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_adds_format_extension() {
        assert_eq!(
            output_path(Path::new("out/review"), ReviewFormat::Markdown),
            PathBuf::from("out/review.md")
        );
        assert_eq!(
            output_path(Path::new("review"), ReviewFormat::Html),
            PathBuf::from("review.html")
        );
        // An explicit extension is left alone, even a foreign one
        assert_eq!(
            output_path(Path::new("review.txt"), ReviewFormat::Html),
            PathBuf::from("review.txt")
        );
    }

    #[test]
    fn test_output_extension_is_read_back_as_same_format() {
        for format in [ReviewFormat::Html, ReviewFormat::Markdown] {
            let path = output_path(Path::new("review"), format);
            assert_eq!(ReviewFormat::from_path(&path), Some(format));
        }
    }
}
