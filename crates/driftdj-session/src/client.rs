//! TCP session client
//!
//! Connects to the generation service and exposes the `MusicSession`
//! control surface. Inbound traffic is handled by a background reader
//! thread that decodes each frame (including the base64 audio payload)
//! and forwards `SessionUpdate`s over a channel; the orchestrator never
//! touches the socket directly.

use std::io::{self, BufReader, BufWriter};
use std::net::TcpStream;
use std::thread;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossbeam::channel::Sender;
use log::{error, info, warn};

use driftdj_core::config::ModelConfig;

use crate::api::{ClientMessage, MusicSession, ServerMessage, SessionUpdate, WeightedPrompt};
use crate::error::SessionResult;
use crate::framing::{read_message, write_message};

/// A live connection to the generation service
pub struct RemoteSession {
    writer: BufWriter<TcpStream>,
}

impl RemoteSession {
    /// Connect and start the background reader
    ///
    /// Updates (setup confirmation, audio chunks, filter notices,
    /// errors, close) arrive on `update_tx`. The reader thread exits on
    /// its own when the transport drops or the receiver is gone.
    pub fn connect(addr: &str, update_tx: Sender<SessionUpdate>) -> SessionResult<Self> {
        info!("Connecting to session service at {}", addr);

        let stream = TcpStream::connect(addr)?;
        let read_stream = stream.try_clone()?;
        let writer = BufWriter::new(stream);

        thread::spawn(move || {
            session_reader_thread(read_stream, update_tx);
        });

        Ok(Self { writer })
    }

    fn send(&mut self, msg: &ClientMessage) -> SessionResult<()> {
        write_message(&mut self.writer, msg)?;
        Ok(())
    }
}

impl MusicSession for RemoteSession {
    fn play(&mut self) -> SessionResult<()> {
        self.send(&ClientMessage::Play)
    }

    fn pause(&mut self) -> SessionResult<()> {
        self.send(&ClientMessage::Pause)
    }

    fn stop(&mut self) -> SessionResult<()> {
        self.send(&ClientMessage::Stop)
    }

    fn reset_context(&mut self) -> SessionResult<()> {
        self.send(&ClientMessage::ResetContext)
    }

    fn set_weighted_prompts(&mut self, prompts: &[WeightedPrompt]) -> SessionResult<()> {
        self.send(&ClientMessage::SetWeightedPrompts {
            prompts: prompts.to_vec(),
        })
    }

    fn set_music_generation_config(&mut self, config: &ModelConfig) -> SessionResult<()> {
        self.send(&ClientMessage::SetMusicGenerationConfig {
            config: config.clone(),
        })
    }

    fn close(&mut self) -> SessionResult<()> {
        // Best-effort goodbye; the socket drop does the real work
        let result = self.send(&ClientMessage::Close);
        if let Ok(stream) = self.writer.get_ref().try_clone() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        result
    }
}

/// Background thread that reads and decodes service messages
fn session_reader_thread(stream: TcpStream, update_tx: Sender<SessionUpdate>) {
    let mut reader = BufReader::new(stream);

    loop {
        match read_message::<_, ServerMessage>(&mut reader) {
            Ok(msg) => {
                let update = match msg {
                    ServerMessage::SetupComplete => SessionUpdate::SetupComplete,
                    ServerMessage::AudioChunk { data } => match BASE64.decode(&data) {
                        Ok(bytes) => SessionUpdate::Chunk(bytes),
                        Err(e) => {
                            warn!("Dropping undecodable audio chunk: {}", e);
                            continue;
                        }
                    },
                    ServerMessage::FilteredPrompt { text, reason } => {
                        SessionUpdate::FilteredPrompt { text, reason }
                    }
                    ServerMessage::Error { message } => SessionUpdate::Error(message),
                };

                if update_tx.send(update).is_err() {
                    // Receiver dropped, the client is shutting down
                    break;
                }
            }
            Err(e) => {
                if e.kind() != io::ErrorKind::UnexpectedEof {
                    error!("Session read error: {}", e);
                }
                let _ = update_tx.send(SessionUpdate::Closed);
                break;
            }
        }
    }

    info!("Session reader thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use std::io::Write;
    use std::net::TcpListener;

    /// Spin up a loopback server, push one scripted message stream, and
    /// check the decoded updates on the client side.
    #[test]
    fn test_reader_decodes_scripted_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            write_message(&mut stream, &ServerMessage::SetupComplete).unwrap();
            write_message(
                &mut stream,
                &ServerMessage::AudioChunk {
                    data: BASE64.encode([1u8, 2, 3, 4]),
                },
            )
            .unwrap();
            stream.flush().unwrap();
            // Drop closes the connection
        });

        let (tx, rx) = unbounded();
        let _session = RemoteSession::connect(&addr, tx).unwrap();

        assert_eq!(rx.recv().unwrap(), SessionUpdate::SetupComplete);
        assert_eq!(rx.recv().unwrap(), SessionUpdate::Chunk(vec![1, 2, 3, 4]));
        assert_eq!(rx.recv().unwrap(), SessionUpdate::Closed);

        server.join().unwrap();
    }

    #[test]
    fn test_client_messages_reach_the_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let msg: ClientMessage = read_message(&mut stream).unwrap();
            matches!(msg, ClientMessage::Play)
        });

        let (tx, _rx) = unbounded();
        let mut session = RemoteSession::connect(&addr, tx).unwrap();
        session.play().unwrap();

        assert!(server.join().unwrap());
    }
}
