//! rfsnap: capture one element of an HTML page as an image

use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rfsnap::{
    Background, CaptureOptions, Capturer, CommandClipboard, Delivered, DeliveryMode, DirectoryDownloader, Document,
    ImageFormat, LogNotifier, OutputSink, Target, Viewport,
};
use url::Url;

/// Capture one element of an HTML page as an image
#[derive(Parser, Debug)]
#[command(name = "rfsnap", version, about)]
struct Args {
    /// HTML file, or an http(s) URL with the `fetch` feature
    input: String,

    /// Element to capture (defaults to the body)
    #[arg(long, short)]
    selector: Option<String>,

    /// Base URL for a local file (defaults to its file:// URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Content for a linked stylesheet, HREF=PATH (repeatable)
    #[arg(long = "stylesheet", value_parser = parse_stylesheet_arg)]
    stylesheets: Vec<(String, PathBuf)>,

    /// png, jpeg or webp
    #[arg(long)]
    format: Option<ImageFormat>,

    /// Lossy quality, 0-1
    #[arg(long)]
    quality: Option<f32>,

    /// Pixels per CSS px
    #[arg(long)]
    scale: Option<f32>,

    /// Background color or `transparent`
    #[arg(long)]
    background: Option<Background>,

    /// Layout viewport, WIDTHxHEIGHT
    #[arg(long)]
    viewport: Option<Viewport>,

    /// Directory downloads are written to
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// File stem of the download
    #[arg(long)]
    filename: Option<String>,

    /// Copy to the system clipboard instead of saving
    #[arg(long, conflicts_with = "stdout")]
    clipboard: bool,

    /// Write the encoded image to stdout
    #[arg(long)]
    stdout: bool,

    /// JSON file with capture options; flags override it
    #[arg(long)]
    options: Option<PathBuf>,
}

fn parse_stylesheet_arg(value: &str) -> std::result::Result<(String, PathBuf), String> {
    let (href, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected HREF=PATH, got `{value}`"))?;
    Ok((href.to_string(), PathBuf::from(path)))
}

#[cfg(feature = "fetch")]
fn fetch_document(url: &str) -> Result<Document> {
    Ok(Document::fetch(url, &rfsnap::FetchConfig::default())?)
}

#[cfg(not(feature = "fetch"))]
fn fetch_document(url: &str) -> Result<Document> {
    anyhow::bail!("cannot fetch {url}: built without the `fetch` feature")
}

fn load_document(args: &Args) -> Result<Document> {
    let mut document = if args.input.starts_with("http://") || args.input.starts_with("https://") {
        fetch_document(&args.input)?
    } else {
        let path = PathBuf::from(&args.input);
        let markup = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let base = match &args.base_url {
            Some(base) => base.clone(),
            None => {
                let absolute = path.canonicalize().with_context(|| format!("resolving {}", path.display()))?;
                Url::from_file_path(&absolute)
                    .map_err(|_| anyhow!("cannot turn {} into a URL", absolute.display()))?
                    .to_string()
            }
        };
        Document::parse(&markup, &base)?
    };

    for (href, path) in &args.stylesheets {
        let css = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        if !document.attach_stylesheet(href, &css) {
            log::warn!("no <link rel=\"stylesheet\"> refers to {}", href);
        }
    }
    if let Some(viewport) = args.viewport {
        document = document.with_viewport(viewport);
    }
    Ok(document)
}

fn capture_options(args: &Args) -> Result<CaptureOptions> {
    let mut options = match &args.options {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            CaptureOptions::from_json(&text)?
        }
        None => CaptureOptions::default(),
    };
    if let Some(format) = args.format {
        options.format = format;
    }
    if let Some(quality) = args.quality {
        options.quality = quality;
    }
    if args.scale.is_some() {
        options.scale = args.scale;
    }
    if let Some(background) = args.background {
        options.background = background;
    }
    if let Some(filename) = &args.filename {
        options.filename = filename.clone();
    }
    options.delivery = if args.clipboard {
        DeliveryMode::Clipboard
    } else if args.stdout {
        DeliveryMode::Return
    } else if options.delivery == DeliveryMode::Clipboard {
        DeliveryMode::Clipboard
    } else {
        DeliveryMode::Download
    };
    Ok(options)
}

async fn run(document: &Document, target: &Target, options: &CaptureOptions, out_dir: PathBuf) -> Result<()> {
    let report = Capturer::new(document).capture_detailed(target, options).await?;
    let route = report.route;
    let digest = report.image.digest();
    let (width, height) = (report.image.width(), report.image.height());

    let downloader = DirectoryDownloader::new(out_dir);
    let clipboard = CommandClipboard::detect();
    let sink = OutputSink::new(&LogNotifier)
        .with_downloader(&downloader)
        .with_clipboard(&clipboard);
    let summary = format!("route: {route}\nsize: {width}x{height}\nsha256: {digest}");
    match sink.deliver(report.image, options.delivery, &options.filename).await? {
        Delivered::Returned(image) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(image.bytes())?;
            stdout.flush()?;
            eprintln!("{summary}");
        }
        Delivered::Downloaded(path) => println!("{}\n{summary}", path.display()),
        Delivered::Copied(via) => println!("copied to clipboard ({via})\n{summary}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    // Fetching uses a blocking client, so it happens before the runtime starts.
    let document = load_document(&args)?;
    let options = capture_options(&args)?;
    let target = match &args.selector {
        Some(sel) => Target::selector(sel.as_str()),
        None => Target::Body,
    };

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(run(&document, &target, &options, args.out_dir.clone()))
}
