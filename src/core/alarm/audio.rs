//! Alarm sound through the default output device.
//!
//! `rodio`'s output stream must stay on the thread that opened it, so all
//! sinks live on a dedicated audio thread driven by a command channel.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;

use rodio::{Decoder, OutputStreamBuilder, Sink};

use super::playback::{AlarmPlayback, SoundHandle};
use crate::core::error::{Error, Result};

enum AudioCommand {
    Load {
        handle: SoundHandle,
        reply: mpsc::Sender<Result<()>>,
    },
    Play(SoundHandle),
    Release(SoundHandle),
}

pub struct RodioPlayback {
    commands: mpsc::Sender<AudioCommand>,
    next_id: AtomicU64,
}

impl RodioPlayback {
    /// Open the default output device and prepare to loop `sound_path`.
    pub fn new(sound_path: PathBuf) -> Result<Self> {
        let (commands, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        thread::Builder::new()
            .name("alarm-audio".to_string())
            .spawn(move || audio_thread(sound_path, rx, ready_tx))?;

        ready_rx
            .recv()
            .map_err(|_| Error::Audio("audio thread exited during startup".to_string()))??;

        Ok(Self {
            commands,
            next_id: AtomicU64::new(0),
        })
    }

    fn send(&self, command: AudioCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Audio("audio thread is not running".to_string()))
    }
}

impl AlarmPlayback for RodioPlayback {
    /// Blocks until the audio thread has decoded the file. Call from a blocking context.
    fn load_looping(&self) -> Result<SoundHandle> {
        let handle = SoundHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (reply, reply_rx) = mpsc::channel();
        self.send(AudioCommand::Load { handle, reply })?;
        reply_rx
            .recv()
            .map_err(|_| Error::Audio("audio thread dropped the load request".to_string()))??;
        Ok(handle)
    }

    fn play(&self, handle: SoundHandle) -> Result<()> {
        self.send(AudioCommand::Play(handle))
    }

    fn release(&self, handle: SoundHandle) -> Result<()> {
        self.send(AudioCommand::Release(handle))
    }
}

fn audio_thread(
    sound_path: PathBuf,
    rx: mpsc::Receiver<AudioCommand>,
    ready: mpsc::Sender<Result<()>>,
) {
    let mut stream = match OutputStreamBuilder::open_default_stream() {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(Error::Audio(e.to_string())));
            return;
        }
    };
    stream.log_on_drop(false);
    let _ = ready.send(Ok(()));

    let mut sinks: HashMap<SoundHandle, Sink> = HashMap::new();

    // Runs until every RodioPlayback sender is dropped
    while let Ok(command) = rx.recv() {
        match command {
            AudioCommand::Load { handle, reply } => {
                let result = open_looped(&sound_path).map(|source| {
                    let sink = Sink::connect_new(stream.mixer());
                    sink.pause();
                    sink.append(source);
                    sinks.insert(handle, sink);
                });
                let _ = reply.send(result);
            }
            AudioCommand::Play(handle) => match sinks.get(&handle) {
                Some(sink) => sink.play(),
                None => log::warn!("Play requested for unknown sound #{}", handle.id()),
            },
            AudioCommand::Release(handle) => {
                if let Some(sink) = sinks.remove(&handle) {
                    sink.stop();
                }
            }
        }
    }

    log::debug!("Audio thread shutting down");
}

fn open_looped(path: &Path) -> Result<rodio::decoder::LoopedDecoder<BufReader<File>>> {
    let file = File::open(path)?;
    Decoder::new_looped(BufReader::new(file))
        .map_err(|e| Error::Audio(format!("cannot decode {}: {}", path.display(), e)))
}
