//! protoloom - Decode and inspect protobuf data against a compiled schema
//!
//! This tool loads a `FileDescriptorSet` (as written by
//! `protoc --descriptor_set_out --include_imports`) and uses it to print
//! binary protobuf messages in text format, or to summarize the schema itself.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use protoloom_core::wire::{DEFAULT_RECURSION_LIMIT, DEFAULT_SIZE_LIMIT};
use protoloom_core::{
    text, DecodeOptions, DescriptorGraph, ExtensionRegistry, FieldDescriptor, FieldType,
    Message, MessageDescriptor, MessageStreamReader,
};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;

/// Decode and inspect protobuf data against a compiled descriptor set
#[derive(Parser, Debug)]
#[command(name = "protoloom")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print binary messages in text format
    Decode(DecodeArgs),
    /// List the files, messages, fields and extensions of a descriptor set
    Describe(DescribeArgs),
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Encoded FileDescriptorSet describing the input
    #[arg(short, long, env = "PROTOLOOM_DESCRIPTOR_SET")]
    descriptor_set: PathBuf,

    /// Fully-qualified message type of the input (e.g. tutorial.AddressBook)
    #[arg(short, long)]
    message: String,

    /// Input is a stream of varint-length-prefixed messages
    #[arg(long)]
    delimited: bool,

    /// Drop unknown fields instead of printing them
    #[arg(long)]
    lite: bool,

    /// Maximum bytes per message
    #[arg(long, default_value_t = DEFAULT_SIZE_LIMIT)]
    size_limit: u64,

    /// Maximum nesting depth
    #[arg(long, default_value_t = DEFAULT_RECURSION_LIMIT)]
    recursion_limit: u32,

    /// Binary input file
    input: PathBuf,
}

#[derive(Args, Debug)]
struct DescribeArgs {
    /// Encoded FileDescriptorSet to describe
    #[arg(short, long, env = "PROTOLOOM_DESCRIPTOR_SET")]
    descriptor_set: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match &cli.command {
        Command::Decode(args) => decode_command(args, &mut out),
        Command::Describe(args) => describe_command(args, &mut out),
    }
}

/// Load and link a descriptor set from disk
fn load_graph(path: &Path) -> Result<DescriptorGraph> {
    trace!("Reading {}", path.display());
    let data = fs::read(path)
        .with_context(|| format!("Failed to read descriptor set: {}", path.display()))?;
    let graph = DescriptorGraph::decode(&data)
        .with_context(|| format!("Failed to load descriptor set: {}", path.display()))?;
    debug!("Loaded {} file(s) from {}", graph.files().len(), path.display());
    Ok(graph)
}

fn decode_command(args: &DecodeArgs, out: &mut impl Write) -> Result<()> {
    let graph = load_graph(&args.descriptor_set)?;
    let descriptor = graph
        .get_message_by_name(&args.message)
        .with_context(|| format!("Message type not found in descriptor set: {}", args.message))?;
    let registry = ExtensionRegistry::from_graph(&graph)
        .context("Failed to register extensions")?;

    // A missing input is nothing to show, not a failure
    if !args.input.exists() {
        writeln!(out, "Nothing to show: {} does not exist", args.input.display())?;
        return Ok(());
    }

    let mut options = DecodeOptions::new()
        .size_limit(args.size_limit)
        .recursion_limit(args.recursion_limit);
    if args.lite {
        options = options.lite();
    }
    info!(
        "Decoding {} as {} ({:?} runtime)",
        args.input.display(),
        descriptor.full_name(),
        options.mode
    );

    if args.delimited {
        let file = fs::File::open(&args.input)
            .with_context(|| format!("Failed to open input file: {}", args.input.display()))?;
        let reader =
            MessageStreamReader::with_options(file, &descriptor, &options).with_registry(&registry);
        for (i, message) in reader.enumerate() {
            let message =
                message.with_context(|| format!("Failed to decode message {} of stream", i))?;
            writeln!(out, "# message {}", i)?;
            print_message(&message, out)?;
        }
    } else {
        let data = fs::read(&args.input)
            .with_context(|| format!("Failed to read input file: {}", args.input.display()))?;
        trace!("Read {} bytes from {}", data.len(), args.input.display());
        let message = Message::decode_with(&descriptor, &data, &registry, &options)
            .with_context(|| format!("Failed to decode {}", args.input.display()))?;
        print_message(&message, out)?;
    }
    Ok(())
}

fn print_message(message: &Message, out: &mut impl Write) -> Result<()> {
    if !message.is_initialized() {
        warn!(
            "{} is missing required fields: {}",
            message.descriptor().full_name(),
            message.missing_required_fields().join(", ")
        );
    }
    out.write_all(text::to_text(message).as_bytes())?;
    Ok(())
}

fn describe_command(args: &DescribeArgs, out: &mut impl Write) -> Result<()> {
    let graph = load_graph(&args.descriptor_set)?;
    for file in graph.files() {
        writeln!(
            out,
            "file {} (package {}, {})",
            file.name(),
            if file.package().is_empty() { "<none>" } else { file.package() },
            file.syntax().as_str()
        )?;
        for message in file.messages() {
            describe_message(&message, out)?;
        }
        for enum_type in file.enums() {
            describe_enum(&enum_type, "  ", out)?;
        }
        for extension in file.extensions() {
            describe_extension(&extension, out)?;
        }
    }
    Ok(())
}

fn describe_message(message: &MessageDescriptor, out: &mut impl Write) -> Result<()> {
    writeln!(out, "  message {}", message.full_name())?;
    for field in message.fields() {
        writeln!(out, "    {}", field_line(&field))?;
    }
    for enum_type in message.nested_enums() {
        describe_enum(&enum_type, "    ", out)?;
    }
    for extension in message.extensions() {
        describe_extension(&extension, out)?;
    }
    // Map entry types show up as `map<K, V>` on their field instead
    for nested in message.nested_messages() {
        if !nested.is_map_entry() {
            describe_message(&nested, out)?;
        }
    }
    Ok(())
}

fn describe_enum(
    enum_type: &protoloom_core::EnumDescriptor,
    indent: &str,
    out: &mut impl Write,
) -> Result<()> {
    writeln!(out, "{}enum {}", indent, enum_type.full_name())?;
    for value in enum_type.values() {
        writeln!(out, "{}  {} = {}", indent, value.name(), value.number())?;
    }
    Ok(())
}

fn describe_extension(extension: &FieldDescriptor, out: &mut impl Write) -> Result<()> {
    writeln!(
        out,
        "  extend {}: {}",
        extension.containing_type().full_name(),
        field_line(extension)
    )?;
    Ok(())
}

/// `number label type name`, or `number map<K, V> name` for map fields
fn field_line(field: &FieldDescriptor) -> String {
    let name = if field.is_extension() {
        field.full_name()
    } else {
        field.name()
    };
    let entry = field.message_type().filter(|_| field.is_map());
    if let Some((key, value)) = entry.and_then(|e| e.map_key_field().zip(e.map_value_field())) {
        return format!(
            "{} map<{}, {}> {}",
            field.number(),
            type_name(&key),
            type_name(&value),
            name
        );
    }
    format!(
        "{} {} {} {}",
        field.number(),
        field.label().as_str(),
        type_name(field),
        name
    )
}

/// Scalar type, or the referenced type for messages and enums
fn type_name(field: &FieldDescriptor) -> String {
    match field.field_type() {
        FieldType::Message | FieldType::Group => field
            .message_type()
            .map(|m| m.full_name().to_string())
            .unwrap_or_default(),
        FieldType::Enum => field
            .enum_type()
            .map(|e| e.full_name().to_string())
            .unwrap_or_default(),
        other => other.as_str().to_string(),
    }
}
