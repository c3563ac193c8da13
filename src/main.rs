use std::io::BufRead;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nostr_tictactoe::{
    console::{self, Input, HELP},
    env::Settings,
    identity::{signer_from_settings, Keys},
    run_room, Command, GameState, LoggerManager, RoomCode, RoomConfig, RoomLink, RoomUpdate,
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use url::Url;

#[derive(Parser)]
#[command(name = "nostr-tictactoe", version, about = "Tic-tac-toe over a Nostr relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a room (a fresh one when no room is given) and play in the terminal
    Play {
        /// Relay websocket URL, defaults to the configured relay
        #[arg(long)]
        relay: Option<String>,
        /// 8-character room code
        #[arg(long)]
        room: Option<String>,
        /// Invite link carrying both room and relay
        #[arg(long, conflicts_with_all = ["relay", "room"])]
        link: Option<String>,
        /// Secret key (nsec or hex), overrides identity.secret_key
        #[arg(long)]
        nsec: Option<String>,
    },
    /// Print a fresh room code and its invite link
    NewRoom {
        #[arg(long)]
        relay: Option<String>,
    },
    /// Generate a new key pair
    Keygen,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 환경변수 로드
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // 2. 설정 파일 로드
    let settings = Settings::new().context("Failed to load settings")?;

    match cli.command {
        Commands::Keygen => keygen(),
        Commands::NewRoom { relay } => {
            let relay = relay.unwrap_or_else(|| settings.relay.url.clone());
            let link = RoomLink::new(&relay, RoomCode::generate())?;
            println!("room:  {}", link.room);
            println!("relay: {}", link.relay);
            println!("link:  {}", share_url(&settings, &link)?);
            Ok(())
        }
        Commands::Play {
            relay,
            room,
            link,
            nsec,
        } => play(settings, relay, room, link, nsec).await,
    }
}

fn keygen() -> Result<()> {
    let keys = Keys::generate();
    println!("nsec:   {}", keys.to_nsec()?);
    println!("npub:   {}", keys.public_key().to_npub()?);
    println!("pubkey: {}", keys.public_key());
    Ok(())
}

fn share_url(settings: &Settings, link: &RoomLink) -> Result<Url> {
    let base = Url::parse(&settings.room.share_base_url)
        .with_context(|| format!("Invalid share_base_url {}", settings.room.share_base_url))?;
    Ok(link.share_url(&base))
}

async fn play(
    settings: Settings,
    relay: Option<String>,
    room: Option<String>,
    link: Option<String>,
    nsec: Option<String>,
) -> Result<()> {
    // 3. 로거 초기화
    let _logger_manager = LoggerManager::setup(&settings);

    // 4. 방 주소 결정
    let link = match link {
        Some(link) => RoomLink::parse(&link)?,
        None => {
            let code = match room {
                Some(code) => RoomCode::parse(&code)?,
                None => RoomCode::generate(),
            };
            let relay = relay.unwrap_or_else(|| settings.relay.url.clone());
            RoomLink::new(&relay, code)?
        }
    };
    let invite = share_url(&settings, &link)?;

    // 5. 인증 (실패 시 입장 불가)
    let signer = signer_from_settings(&settings.identity, nsec.as_deref())
        .await
        .context("Authentication failed")?;
    let me = signer.public_key().clone();
    println!("Signed in as {}", me.to_npub()?);
    println!("Room {} on {}", link.room, link.relay);
    println!("Invite: {}", invite);
    println!("{}", HELP);

    // 6. 채널 및 Shutdown Token 생성
    let shutdown = CancellationToken::new();
    let (command_tx, command_rx) = mpsc::channel::<Command>(32);
    let (update_tx, mut update_rx) = mpsc::channel::<RoomUpdate>(64);
    let (state_tx, state_rx) = watch::channel(GameState::default());

    // 7. 방 태스크 시작
    let config = RoomConfig::from_settings(link, &settings);
    let mut room_task = tokio::spawn(run_room(
        config,
        signer,
        command_rx,
        update_tx,
        shutdown.clone(),
    ));

    // 8. 표준 입력 스레드 (블로킹 읽기는 런타임 밖에서)
    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut stdin_open = true;
    let outcome = loop {
        tokio::select! {
            result = &mut room_task => break result,
            line = line_rx.recv(), if stdin_open => match line {
                Some(line) => match console::parse_input(&line) {
                    Input::Command(command) => {
                        if command_tx.send(command).await.is_err() {
                            error!("Room task is no longer accepting commands");
                        }
                    }
                    Input::ShowBoard => println!("{}", console::render_state(&state_rx.borrow(), &me)),
                    Input::Share => println!("Invite: {}", invite),
                    Input::Help => println!("{}", HELP),
                    Input::Empty => {}
                    Input::Unknown(text) => println!("Unknown command `{}` (type `help`)", text),
                },
                None => {
                    stdin_open = false;
                    let _ = command_tx.send(Command::Leave).await;
                }
            },
            Some(update) = update_rx.recv() => show_update(update, &me, &state_tx),
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, leaving room");
                shutdown.cancel();
            }
        }
    };

    // 남은 알림 출력
    while let Ok(update) = update_rx.try_recv() {
        show_update(update, &me, &state_tx);
    }

    match outcome {
        Ok(Ok(())) => {
            println!("Left the room.");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("Room ended: {}", e);
            Err(e.into())
        }
        Err(e) => Err(anyhow::anyhow!("Room task panicked: {}", e)),
    }
}

fn show_update(
    update: RoomUpdate,
    me: &nostr_tictactoe::identity::PublicKey,
    state_tx: &watch::Sender<GameState>,
) {
    match update {
        RoomUpdate::State(state) => {
            println!("\n{}", console::render_state(&state, me));
            state_tx.send_replace(state);
        }
        RoomUpdate::Notice(notice) => println!("{}", notice),
    }
}
