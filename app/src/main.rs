use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shade_crypto::{generate_key, FileKeyStore, KeySource, DEFAULT_KEY_PATH};
use shade_redact::{
    decrypt_outputs_for_review, encrypt_inputs, init_logging, list_encrypted_inputs,
    BatchSummary, CancelFlag, Collaborators, Pipeline, Settings, DEFAULT_CONFIG_PATH,
};

#[derive(Parser)]
#[command(name = "shade-redact")]
#[command(about = "Encrypted PII redaction for scanned images and PDFs", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (YAML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Key file (base64)
    #[arg(long, global = true, env = "SHADE_KEY_FILE", default_value = DEFAULT_KEY_PATH)]
    key: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new key file (refuses to overwrite)
    Keygen,

    /// Encrypt supported files in a directory to `<name>.enc`
    Encrypt {
        #[arg(default_value = "input")]
        input_dir: PathBuf,
    },

    /// Redact every `.enc` file in the input directory
    Process {
        #[arg(default_value = "input")]
        input_dir: PathBuf,
        #[arg(default_value = "output")]
        output_dir: PathBuf,
    },

    /// Decrypt `_redacted.enc` outputs for manual review
    Review {
        #[arg(default_value = "output")]
        output_dir: PathBuf,
    },

    /// Encrypt, redact and decrypt for review in one go
    Run {
        #[arg(default_value = "input")]
        input_dir: PathBuf,
        #[arg(default_value = "output")]
        output_dir: PathBuf,
        /// Skip writing decrypted review copies
        #[arg(long)]
        no_review: bool,
    },
}

/// 加载并校验配置、密钥与协作方；任何文件操作之前调用
fn build_pipeline(cli: &Cli) -> Result<Pipeline> {
    let settings = Settings::load(&cli.config)?;
    let collaborators = Collaborators::from_settings(&settings)?;
    Ok(Pipeline::new(settings, &FileKeyStore::new(&cli.key), collaborators)?)
}

fn process(pipeline: &Pipeline, input_dir: &Path, output_dir: &Path) -> Result<BatchSummary> {
    let inputs = list_encrypted_inputs(input_dir)
        .with_context(|| format!("无法读取输入目录 {}", input_dir.display()))?;
    if inputs.is_empty() {
        log::warn!("[Batch] {} 中没有加密文件", input_dir.display());
    }
    let outcomes = pipeline.process_all(&inputs, output_dir, &CancelFlag::new());
    Ok(BatchSummary::of(&outcomes))
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Keygen => {
            generate_key(&cli.key)?;
            log::info!("[Key] 已生成密钥: {}", cli.key.display());
        }
        Commands::Encrypt { input_dir } => {
            let key = FileKeyStore::new(&cli.key).load()?;
            let artifacts = encrypt_inputs(input_dir, &key)?;
            log::info!("[Encrypt] 共加密 {} 个文件", artifacts.len());
        }
        Commands::Process {
            input_dir,
            output_dir,
        } => {
            let pipeline = build_pipeline(&cli)?;
            let summary = process(&pipeline, input_dir, output_dir)?;
            if summary.failed > 0 {
                anyhow::bail!("{} 个文件处理失败", summary.failed);
            }
        }
        Commands::Review { output_dir } => {
            let key = FileKeyStore::new(&cli.key).load()?;
            decrypt_outputs_for_review(output_dir, &key)?;
        }
        Commands::Run {
            input_dir,
            output_dir,
            no_review,
        } => {
            let pipeline = build_pipeline(&cli)?;
            let outcomes = pipeline
                .encrypt_and_process(input_dir, output_dir, &CancelFlag::new())
                .with_context(|| format!("无法处理输入目录 {}", input_dir.display()))?;
            let summary = BatchSummary::of(&outcomes);
            if !no_review {
                let key = FileKeyStore::new(&cli.key).load()?;
                decrypt_outputs_for_review(output_dir, &key)?;
            }
            if summary.failed > 0 {
                anyhow::bail!("{} 个文件处理失败", summary.failed);
            }
        }
    }
    Ok(())
}
