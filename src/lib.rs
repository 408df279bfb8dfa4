pub mod ai;
pub mod config;
pub mod error;
pub mod intake;
pub mod session;

use anyhow::Context;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use ai::enrichment::TreatmentPlanClient;
use ai::openai::ChatCompletionClient;
use ai::prompt::GREETING;
use config::AppConfig;
use error::ConsultError;
use intake::photos::PhotoAttachment;
use intake::sheet::IntakeSheet;
use session::history::ConversationTurn;
use session::manager::SessionManager;

const USAGE: &str = "usage: aegis-doctor <intake.json> [symptom-photo ...]";
const HELP: &str = "Type a question and press Enter. Commands: /photo <path>, /nophoto, /retry, /restart, /quit";

struct Consultation {
    config: AppConfig,
    gateway: ChatCompletionClient,
    advisor: TreatmentPlanClient,
    manager: SessionManager,
    sheet: IntakeSheet,
    symptom_photos: Vec<PathBuf>,
}

fn print_turn(turn: &ConversationTurn) {
    match &turn.rendered {
        Some(rendered) => println!("\nAssistant:\n{}", rendered),
        None => println!("\nAssistant:\n{}\n", turn.content),
    }
}

fn print_error(err: &ConsultError) {
    eprintln!("\n{}\n", err);
}

impl Consultation {
    /// Walks a fresh session from the welcome page to the first reply.
    async fn open(&self) -> anyhow::Result<()> {
        if let Err(e) = self.manager.lock().begin_intake(&self.config) {
            anyhow::bail!("{} Set GROQ_API_KEY or add api_key to config.json.", e);
        }
        self.sheet
            .apply(&mut self.manager.lock())
            .context("intake sheet rejected")?;

        for path in &self.symptom_photos {
            match PhotoAttachment::from_file(path).await {
                Ok(photo) => {
                    let index = self.manager.lock().add_symptom_photo(photo)?;
                    log::info!("Attached symptom photo #{} from {}", index + 1, path.display());
                }
                Err(e) => eprintln!("Skipping {}: {}", path.display(), e),
            }
        }

        println!("\nAssistant:\n{}\n", GREETING);
        match self
            .manager
            .start_consultation(&self.gateway, &self.advisor, self.config.enrichment_timeout())
            .await
        {
            Ok(turn) => print_turn(&turn),
            Err(e) => {
                print_error(&e);
                println!("Use /retry to send the consultation again.");
            }
        }
        Ok(())
    }

    async fn attach(&self, path: &str) {
        match PhotoAttachment::from_file(&PathBuf::from(path)).await {
            Ok(photo) => match self.manager.lock().attach_photo(photo) {
                Ok(()) => println!("Photo attached to your next message."),
                Err(e) => print_error(&e),
            },
            Err(e) => print_error(&ConsultError::from(e)),
        }
    }

    async fn chat(&self) -> anyhow::Result<()> {
        println!("{}", HELP);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            match line {
                "/quit" | "/exit" => break,
                "/restart" => {
                    let restarted = self.manager.lock().restart();
                    match restarted {
                        Ok(()) => self.open().await?,
                        Err(e) => print_error(&e),
                    }
                }
                "/retry" => match self.manager.retry_opening(&self.gateway).await {
                    Ok(turn) => print_turn(&turn),
                    Err(e) => print_error(&e),
                },
                "/nophoto" => {
                    if let Err(e) = self.manager.lock().remove_photo() {
                        print_error(&e);
                    }
                }
                _ => {
                    if let Some(path) = line.strip_prefix("/photo ") {
                        self.attach(path.trim()).await;
                        continue;
                    }
                    match self.manager.send_message(&self.gateway, line).await {
                        Ok(turn) => print_turn(&turn),
                        Err(e) => print_error(&e),
                    }
                }
            }
        }
        Ok(())
    }
}

pub async fn run() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let sheet_path = PathBuf::from(args.next().context(USAGE)?);
    let symptom_photos: Vec<PathBuf> = args.map(PathBuf::from).collect();

    let config_dir = AppConfig::default_dir().context("no configuration directory on this system")?;
    let config = AppConfig::load(&config_dir);
    let sheet = IntakeSheet::load(&sheet_path)
        .with_context(|| format!("could not read intake sheet {}", sheet_path.display()))?;

    let consultation = Consultation {
        gateway: ChatCompletionClient::new(&config)?,
        advisor: TreatmentPlanClient::new(&config)?,
        manager: SessionManager::new(),
        config,
        sheet,
        symptom_photos,
    };

    log::info!("AEGIS Doctor ready. Config: {}", config_dir.display());
    consultation.open().await?;
    consultation.chat().await
}
