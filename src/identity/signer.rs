use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{
    env::{IdentitySettings, LoginMethod},
    errors::IdentityError,
    identity::{Keys, PublicKey},
    protocol::{Event, UnsignedEvent},
};

/// Signs outgoing events on behalf of one participant.
#[async_trait]
pub trait EventSigner: Send + Sync {
    fn public_key(&self) -> &PublicKey;

    async fn sign(&self, event: UnsignedEvent) -> Result<Event, IdentityError>;
}

/// Signs with a secret key held in process memory.
#[derive(Debug, Clone)]
pub struct LocalKeySigner {
    keys: Keys,
}

impl LocalKeySigner {
    pub fn new(keys: Keys) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl EventSigner for LocalKeySigner {
    fn public_key(&self) -> &PublicKey {
        self.keys.public_key()
    }

    async fn sign(&self, event: UnsignedEvent) -> Result<Event, IdentityError> {
        if &event.pubkey != self.keys.public_key() {
            return Err(IdentityError::SignerProtocol(
                "event pubkey does not belong to this signer".to_string(),
            ));
        }
        let id = event.compute_id();
        let sig = self.keys.sign_digest(id);
        Ok(event.into_signed(hex::encode(id), sig.to_string()))
    }
}

/// Delegates signing to an external program that never hands out the key.
///
/// Contract:
/// - `<program> get-public-key` prints the hex x-only public key.
/// - `<program> sign-event` reads an unsigned event as JSON on stdin and prints
///   the signed event as JSON.
///
/// Whatever comes back is verified before use.
#[derive(Debug, Clone)]
pub struct CommandSigner {
    program: String,
    args: Vec<String>,
    public_key: PublicKey,
}

impl CommandSigner {
    /// `command` may carry leading arguments, e.g. `"my-signer --profile game"`.
    pub async fn connect(command: &str) -> Result<Self, IdentityError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(IdentityError::MissingSignerCommand)?;
        let args: Vec<String> = parts.collect();

        let output = run_signer(&program, &args, "get-public-key", None).await?;
        let public_key = PublicKey::from_hex(output.trim()).map_err(|_| {
            IdentityError::SignerProtocol(format!(
                "get-public-key returned `{}`",
                output.trim()
            ))
        })?;

        info!("Delegated signer `{}` ready for {}", program, public_key.short());
        Ok(Self {
            program,
            args,
            public_key,
        })
    }
}

#[async_trait]
impl EventSigner for CommandSigner {
    fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    async fn sign(&self, event: UnsignedEvent) -> Result<Event, IdentityError> {
        let request = serde_json::to_string(&event)
            .map_err(|e| IdentityError::SignerProtocol(e.to_string()))?;
        let output = run_signer(&self.program, &self.args, "sign-event", Some(request)).await?;

        let signed: Event = serde_json::from_str(output.trim())
            .map_err(|e| IdentityError::SignerProtocol(format!("sign-event output: {}", e)))?;
        signed.verify()?;

        if signed.pubkey != self.public_key
            || signed.kind != event.kind
            || signed.tags != event.tags
            || signed.content != event.content
        {
            return Err(IdentityError::SignerProtocol(
                "signed event does not match the request".to_string(),
            ));
        }
        Ok(signed)
    }
}

async fn run_signer(
    program: &str,
    args: &[String],
    operation: &str,
    stdin_payload: Option<String>,
) -> Result<String, IdentityError> {
    let unavailable = |reason: String| IdentityError::SignerUnavailable {
        program: program.to_string(),
        reason,
    };

    debug!("Running signer `{}` {}", program, operation);
    let mut child = Command::new(program)
        .args(args)
        .arg(operation)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| unavailable(e.to_string()))?;

    // stdin is fed while stdout is drained so a chatty signer cannot stall on a full pipe
    let stdin = child.stdin.take();
    let feed = async move {
        if let (Some(mut stdin), Some(payload)) = (stdin, stdin_payload) {
            stdin.write_all(payload.as_bytes()).await?;
        }
        // dropping stdin closes the pipe so the signer sees EOF
        Ok::<(), std::io::Error>(())
    };

    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output.map_err(|e| unavailable(e.to_string()))?;
    if let Err(e) = fed {
        // a signer that exits without reading its input reports through its status
        debug!("Signer `{}` stopped reading stdin: {}", program, e);
    }

    if !output.status.success() {
        return Err(IdentityError::SignerProtocol(format!(
            "{} exited with {}: {}",
            operation,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    String::from_utf8(output.stdout).map_err(|e| IdentityError::SignerProtocol(e.to_string()))
}

/// Builds the signer selected by configuration. `secret_override` (e.g. a CLI
/// flag) takes precedence over the configured key for `LoginMethod::Key`.
pub async fn signer_from_settings(
    settings: &IdentitySettings,
    secret_override: Option<&str>,
) -> Result<Arc<dyn EventSigner>, IdentityError> {
    match settings.method {
        LoginMethod::Key => {
            let secret = secret_override
                .or(settings.secret_key.as_deref())
                .ok_or(IdentityError::MissingSecretKey)?;
            let keys = Keys::parse(secret)?;
            info!("Using local key for {}", keys.public_key().short());
            Ok(Arc::new(LocalKeySigner::new(keys)))
        }
        LoginMethod::Delegated => {
            let command = settings
                .signer_command
                .as_deref()
                .ok_or(IdentityError::MissingSignerCommand)?;
            Ok(Arc::new(CommandSigner::connect(command).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::GAME_STATE_KIND;

    fn unsigned_for(pubkey: &PublicKey) -> UnsignedEvent {
        UnsignedEvent {
            pubkey: pubkey.clone(),
            created_at: 1_700_000_000,
            kind: GAME_STATE_KIND,
            tags: vec![vec!["d".to_string(), "ABCD1234".to_string()]],
            content: "{}".to_string(),
        }
    }

    #[test]
    fn local_signer_produces_verifiable_event() {
        let keys = Keys::generate();
        let signer = LocalKeySigner::new(keys.clone());
        let event = tokio_test::block_on(signer.sign(unsigned_for(keys.public_key()))).unwrap();

        assert_eq!(&event.pubkey, keys.public_key());
        assert_eq!(event.id.len(), 64);
        assert_eq!(event.sig.len(), 128);
        event.verify().unwrap();
    }

    #[test]
    fn local_signer_refuses_foreign_pubkey() {
        let signer = LocalKeySigner::new(Keys::generate());
        let other = Keys::generate();
        let result = tokio_test::block_on(signer.sign(unsigned_for(other.public_key())));
        assert!(matches!(result, Err(IdentityError::SignerProtocol(_))));
    }

    #[tokio::test]
    async fn missing_signer_program_is_unavailable() {
        let result = CommandSigner::connect("/nonexistent/nostr-signer --flag").await;
        assert!(matches!(
            result,
            Err(IdentityError::SignerUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn signer_with_garbage_output_is_rejected() {
        // `echo get-public-key` prints the operation name, not a key
        let result = CommandSigner::connect("echo").await;
        assert!(matches!(result, Err(IdentityError::SignerProtocol(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signer_flooding_stdout_before_reading_stdin_completes() {
        // prints well past a pipe buffer, then consumes the request
        let script = "head -c 262144 /dev/zero | tr '\\0' x; cat > /dev/null";
        let args = vec!["-c".to_string(), script.to_string(), "sh".to_string()];
        let payload = "y".repeat(262_144);

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            run_signer("sh", &args, "sign-event", Some(payload)),
        )
        .await
        .expect("signer exchange stalled")
        .unwrap();
        assert_eq!(output.len(), 262_144);
    }

    #[tokio::test]
    async fn key_login_requires_a_secret() {
        let settings = IdentitySettings {
            method: LoginMethod::Key,
            secret_key: None,
            signer_command: None,
        };
        assert!(matches!(
            signer_from_settings(&settings, None).await,
            Err(IdentityError::MissingSecretKey)
        ));

        let keys = Keys::generate();
        let secret = keys.to_nsec().unwrap();
        let signer = signer_from_settings(&settings, Some(&secret)).await.unwrap();
        assert_eq!(signer.public_key(), keys.public_key());
    }

    #[tokio::test]
    async fn delegated_login_requires_a_command() {
        let settings = IdentitySettings {
            method: LoginMethod::Delegated,
            secret_key: None,
            signer_command: None,
        };
        assert!(matches!(
            signer_from_settings(&settings, None).await,
            Err(IdentityError::MissingSignerCommand)
        ));
    }
}
