//! Tokenize text with a tokenizer stored in a local model folder.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use pico_args::Arguments;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pie_tokenizer::{AutoTokenizer, Message};

const HELP: &str = "\
Usage: pie-tokenize [OPTIONS] <MODEL_DIR> <TEXT>...

Encode TEXT with the tokenizer in MODEL_DIR and print ids, tokens and the
decoded text.

Options:
  --chat            Wrap TEXT in a user turn and apply the chat template
  --skip-special    Drop special tokens when decoding
  --log-dir <DIR>   Write logs to a daily file in DIR instead of stderr
  -v, --verbose     Log at debug level
  -h, --help        Print this help
";

#[derive(Debug)]
struct Args {
    model_dir: PathBuf,
    text: String,
    chat: bool,
    skip_special: bool,
    verbose: bool,
    log_dir: Option<PathBuf>,
}

impl Args {
    /// Parse flags first, then the positional model folder and text words.
    fn parse(mut args: Arguments) -> Result<Self> {
        let chat = args.contains("--chat");
        let skip_special = args.contains("--skip-special");
        let verbose = args.contains(["-v", "--verbose"]);
        let log_dir: Option<PathBuf> = args.opt_value_from_str("--log-dir")?;
        let model_dir: PathBuf = args.free_from_str().context("missing MODEL_DIR")?;

        let mut words = Vec::new();
        for word in args.finish() {
            let word = word.into_string().map_err(|w| anyhow::anyhow!("non UTF-8 argument {w:?}"))?;
            if word.starts_with("--") {
                bail!("unknown flag {word}");
            }
            words.push(word);
        }

        Ok(Args {
            model_dir,
            text: words.join(" "),
            chat,
            skip_special,
            verbose,
            log_dir,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut raw = Arguments::from_env();
    if raw.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }
    let args = Args::parse(raw)?;
    init_tracing(&args.log_dir, args.verbose)?;

    let tokenizer = AutoTokenizer::from_folder(&args.model_dir)
        .await
        .with_context(|| format!("Failed to load tokenizer from {:?}", args.model_dir))?;

    let ids = if args.chat {
        tokenizer.apply_chat_template(&[Message::user(args.text.as_str())])?
    } else {
        tokenizer.encode(&args.text)
    };
    let tokens: Vec<&str> = ids
        .iter()
        .map(|&id| tokenizer.id_to_token(id).unwrap_or("<?>"))
        .collect();

    println!("ids:     {ids:?}");
    println!("tokens:  {tokens:?}");
    println!("decoded: {:?}", tokenizer.decode_with(&ids, args.skip_special));
    Ok(())
}

/// Initialize the tracing subscriber, logging to stderr or to a daily file.
fn init_tracing(log_dir: &Option<PathBuf>, verbose: bool) -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = if let Some(dir) = log_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {dir:?}"))?;

        let file_appender = tracing_appender::rolling::daily(dir, "pie-tokenize.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        std::mem::forget(guard);

        Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
    } else {
        None
    };

    let stderr_layer = if log_dir.is_none() {
        Some(fmt::layer().with_writer(std::io::stderr))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::*;

    fn parse(args: &[&str]) -> Result<Args> {
        Args::parse(Arguments::from_vec(args.iter().map(OsString::from).collect()))
    }

    #[test]
    fn test_flags_and_positionals() {
        let args = parse(&["--chat", "models/gpt2", "Hello", "-v", "world", "--log-dir", "logs"]).unwrap();
        assert!(args.chat);
        assert!(args.verbose);
        assert!(!args.skip_special);
        assert_eq!(args.model_dir, PathBuf::from("models/gpt2"));
        assert_eq!(args.text, "Hello world");
        assert_eq!(args.log_dir, Some(PathBuf::from("logs")));
    }

    #[test]
    fn test_missing_model_dir() {
        assert!(parse(&["--skip-special"]).is_err());
    }

    #[test]
    fn test_unknown_flag() {
        assert!(parse(&["models/gpt2", "--bogus", "hi"]).is_err());
    }
}
