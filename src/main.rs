//! Strata CLI - out-of-core raster streaming
//!
//! A demonstration CLI for the Strata library.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use strata::execution::ProgressCallback;
use strata::io::registry;
use strata::prelude::*;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("🗺️  Strata - out-of-core raster streaming v{}", strata::VERSION);
    println!();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        return;
    }

    let result = match args[1].as_str() {
        "plan" => plan(&args[2..]),
        "write" => write(&args[2..]),
        "help" | "--help" | "-h" => {
            print_usage(&args[0]);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage(&args[0]);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

fn print_usage(program: &str) {
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  plan <WxH> [options] [key=value ...]   Print the partition plan for a raster");
    println!("  write <file[?&options]> [options]      Stream a synthetic raster to a file");
    println!("  help                                   Show this help message");
    println!();
    println!("Options:");
    println!("  --type <t>        Component type (uint8, int16, float, cfloat, ...; default float)");
    println!("  --bands <n>       Number of components (default 1)");
    println!("  --config <file>   TOML file with a [streaming] table");
    println!();
    println!("Write options:");
    println!("  --size <WxH>      Raster size (default 4096x4096)");
    println!("  --gain <g>        Apply value * g");
    println!("  --offset <o>      Apply value + o");
    println!("  --mean <r>        Box mean of radius r");
    println!();
    println!("Streaming keys: streaming.type, streaming.sizemode, streaming.sizevalue,");
    println!("                streaming.ram, streaming.bias");
}

/// Options shared by both commands.
struct Common {
    component: ComponentType,
    bands: usize,
    options: StreamingOptions,
    warnings: Vec<StreamingWarning>,
}

impl Common {
    fn new() -> Self {
        Self {
            component: ComponentType::F32,
            bands: 1,
            options: StreamingOptions::new(),
            warnings: Vec::new(),
        }
    }

    /// Consume a shared option at `args[i]`, returning how many arguments it used.
    fn parse(&mut self, args: &[String], i: usize) -> Result<Option<usize>> {
        let value = || {
            args.get(i + 1)
                .with_context(|| format!("{} needs a value", args[i]))
        };
        match args[i].as_str() {
            "--type" => {
                self.component = value()?
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!(e))?;
                Ok(Some(2))
            }
            "--bands" => {
                self.bands = value()?.parse().context("--bands expects an integer")?;
                Ok(Some(2))
            }
            "--config" => {
                let path = value()?;
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path))?;
                let (options, warnings) = StreamingOptions::from_toml_str(&text)?;
                self.options = options;
                self.warnings.extend(warnings);
                Ok(Some(2))
            }
            arg if arg.contains('=') && !arg.starts_with('-') => {
                if let Some((key, value)) = arg.split_once('=') {
                    self.warnings.extend(self.options.set(key, value));
                }
                Ok(Some(1))
            }
            _ => Ok(None),
        }
    }

    fn layout(&self) -> PixelLayout {
        PixelLayout::new(self.component, self.bands)
    }
}

fn parse_size(s: &str) -> Result<[u64; 2]> {
    let Some((w, h)) = s.split_once('x') else {
        bail!("size '{}' must look like WIDTHxHEIGHT", s);
    };
    Ok([w.parse()?, h.parse()?])
}

fn plan(args: &[String]) -> Result<()> {
    let Some(size) = args.first() else {
        bail!("plan needs a raster size, e.g. 10000x10000");
    };
    let size = parse_size(size)?;

    let mut common = Common::new();
    let mut i = 1;
    while i < args.len() {
        match common.parse(args, i)? {
            Some(used) => i += used,
            None => bail!("Unknown option: {}", args[i]),
        }
    }

    let mut graph = PipelineGraph::new();
    let source = graph.add(ConstantSource::new(size, common.layout(), 0.0));
    graph.update_output_information(source)?;

    let mut manager = StreamingManager::new();
    common.warnings.extend(common.options.apply(&mut manager));
    for warning in &common.warnings {
        println!("⚠️  {}", warning);
    }

    let plan = manager.prepare_streaming(
        &graph,
        &[source],
        Region::from_size(size),
        &[strata::streaming::StorageConstraints::new("plan", true)],
    )?;

    println!("📐 {} with {}", plan.region, plan.strategy);
    if plan.is_single_partition() {
        println!("   Streaming disabled, the raster is written in one piece");
    }
    println!(
        "   {} partitions, {} bytes/pixel, largest ~{:.1} MB",
        plan.number_of_splits(),
        plan.bytes_per_pixel,
        plan.max_partition_bytes() as f64 / (1024.0 * 1024.0)
    );
    for (index, region) in plan.iter().enumerate().take(10) {
        println!("   • #{:<4} {}", index, region);
    }
    if plan.number_of_splits() > 10 {
        println!("   … {} more", plan.number_of_splits() - 10);
    }
    Ok(())
}

fn write(args: &[String]) -> Result<()> {
    let Some(filename) = args.first() else {
        bail!("write needs an output file");
    };

    let mut common = Common::new();
    let mut size = [4096, 4096];
    let mut gain = None;
    let mut offset = None;
    let mut mean = None;

    let mut i = 1;
    while i < args.len() {
        if let Some(used) = common.parse(args, i)? {
            i += used;
            continue;
        }
        let value = args
            .get(i + 1)
            .with_context(|| format!("{} needs a value", args[i]))?;
        match args[i].as_str() {
            "--size" => size = parse_size(value)?,
            "--gain" => gain = Some(value.parse::<f64>()?),
            "--offset" => offset = Some(value.parse::<f64>()?),
            "--mean" => mean = Some(value.parse::<u64>()?),
            other => bail!("Unknown option: {}", other),
        }
        i += 2;
    }

    let mut graph = PipelineGraph::new();
    let mut node = if common.bands == 1 {
        graph.add(GradientSource::new(size, common.component))
    } else {
        graph.add(ConstantSource::new(size, common.layout(), 1.0))
    };
    if gain.is_some() || offset.is_some() {
        let linear = graph.add(LinearTransform::new(gain.unwrap_or(1.0), offset.unwrap_or(0.0)));
        graph.connect(node, linear, 0)?;
        node = linear;
    }
    if let Some(radius) = mean {
        let filter = graph.add(BoxMean::new([radius, radius]));
        graph.connect(node, filter, 0)?;
        node = filter;
    }

    registry::initialize_global(StorageRegistry::with_builtins());
    let mut writer = ImageWriter::for_filename(filename)
        .with_context(|| format!("opening {}", filename))?
        .with_input(node);
    writer.apply_options(&common.options);

    let progress: ProgressCallback = Arc::new(|update| match update {
        ProgressUpdate::Started { total_partitions } => {
            println!("⚙️  Writing {} partitions", total_partitions);
        }
        ProgressUpdate::PartitionCompleted { index, total, duration_ms } => {
            println!("   • {}/{} in {}ms", index + 1, total, duration_ms);
        }
        ProgressUpdate::Completed { total_duration_ms, partitions } => {
            println!("✅ Complete in {}ms ({} partitions)", total_duration_ms, partitions);
        }
        ProgressUpdate::Error { message, .. } => {
            eprintln!("❌ Error: {}", message);
        }
        _ => {}
    });
    writer.set_progress_callback(Some(progress));

    for warning in &common.warnings {
        println!("⚠️  {}", warning);
    }
    let summary = writer.write(&mut graph);
    registry::shutdown_global();
    let summary = summary?;

    for warning in &summary.warnings {
        println!("⚠️  {}", warning);
    }
    println!(
        "🎉 {} written with {} ({} partitions)",
        filename, summary.plan.strategy, summary.partitions_written
    );
    Ok(())
}
