//! Playback sinks: decoded waveforms → audio output.
//!
//! [`RodioSink`] owns the rodio output stream on a dedicated OS thread
//! (`OutputStream` is `!Send`) and takes commands over a channel.
//! Non-positional clips queue on one shared sink; positional clips each get
//! their own `SpatialSink` so several speakers can overlap. rodio applies no
//! reverb or listener effects, so spatial clips are always heard dry.

use std::sync::mpsc;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink, SpatialSink};
use tracing::{debug, error, info};

use skald_core::types::{SpatialTarget, Waveform};

use crate::error::PlaybackError;

/// Destination for decoded speech.
pub trait PlaybackSink: Send + Sync {
    /// Start playing `waveform`, positioned at `target` when given. Returns
    /// once the clip is handed off; does not wait for it to finish.
    fn play(
        &self,
        waveform: Waveform,
        target: Option<SpatialTarget>,
    ) -> Result<(), PlaybackError>;

    /// Move the listener; affects positional clips started afterwards.
    fn set_listener(&self, _pose: ListenerPose) -> Result<(), PlaybackError> {
        Ok(())
    }

    /// Stop everything that is playing.
    fn stop(&self) -> Result<(), PlaybackError> {
        Ok(())
    }
}

/// Ear positions used for spatial playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerPose {
    pub left_ear: [f32; 3],
    pub right_ear: [f32; 3],
}

/// Half the distance between the ears.
const EAR_OFFSET: f32 = 0.1;

impl ListenerPose {
    /// Listener standing at `position`, facing down -z.
    pub fn at(position: [f32; 3]) -> Self {
        let [x, y, z] = position;
        Self {
            left_ear: [x - EAR_OFFSET, y, z],
            right_ear: [x + EAR_OFFSET, y, z],
        }
    }
}

impl Default for ListenerPose {
    fn default() -> Self {
        Self::at([0.0, 0.0, 0.0])
    }
}

enum PlayCmd {
    Play {
        waveform: Waveform,
        target: Option<SpatialTarget>,
    },
    Listener(ListenerPose),
    Stop,
}

/// Cloneable handle to the playback thread.
#[derive(Clone)]
pub struct RodioSink {
    cmd_tx: mpsc::Sender<PlayCmd>,
}

impl RodioSink {
    /// Open the default output device on a new playback thread.
    pub fn new(listener: ListenerPose) -> Result<Self, PlaybackError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<PlayCmd>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        std::thread::Builder::new()
            .name("skald-playback".into())
            .spawn(move || playback_thread(cmd_rx, ready_tx, listener))
            .map_err(|e| {
                PlaybackError::Unavailable(format!("failed to spawn playback thread: {e}"))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { cmd_tx }),
            Ok(Err(e)) => Err(PlaybackError::Unavailable(e)),
            Err(_) => Err(PlaybackError::Closed),
        }
    }
}

impl PlaybackSink for RodioSink {
    fn play(
        &self,
        waveform: Waveform,
        target: Option<SpatialTarget>,
    ) -> Result<(), PlaybackError> {
        check_format(&waveform)?;
        self.cmd_tx
            .send(PlayCmd::Play { waveform, target })
            .map_err(|_| PlaybackError::Closed)
    }

    fn set_listener(&self, pose: ListenerPose) -> Result<(), PlaybackError> {
        self.cmd_tx
            .send(PlayCmd::Listener(pose))
            .map_err(|_| PlaybackError::Closed)
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        self.cmd_tx.send(PlayCmd::Stop).map_err(|_| PlaybackError::Closed)
    }
}

/// rodio asserts on a zero channel count or sample rate, which would take
/// the playback thread down with it.
fn check_format(waveform: &Waveform) -> Result<(), PlaybackError> {
    if waveform.channels == 0 || waveform.sample_rate == 0 {
        return Err(PlaybackError::InvalidFormat {
            channels: waveform.channels,
            sample_rate: waveform.sample_rate,
        });
    }
    Ok(())
}

/// Sink that discards audio; for headless servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl PlaybackSink for NullSink {
    fn play(
        &self,
        waveform: Waveform,
        target: Option<SpatialTarget>,
    ) -> Result<(), PlaybackError> {
        debug!(
            "null sink: dropping {:?} of audio (positional: {})",
            waveform.duration(),
            target.is_some()
        );
        Ok(())
    }
}

fn clip(waveform: Waveform) -> Option<SamplesBuffer<f32>> {
    match check_format(&waveform) {
        Ok(()) => Some(SamplesBuffer::new(
            waveform.channels,
            waveform.sample_rate,
            waveform.samples,
        )),
        Err(e) => {
            error!("playback: dropping clip: {e}");
            None
        }
    }
}

// ─── Playback OS thread ───────────────────────────────────────────────────

fn playback_thread(
    cmd_rx: mpsc::Receiver<PlayCmd>,
    ready_tx: mpsc::Sender<Result<(), String>>,
    mut listener: ListenerPose,
) {
    let (_stream, stream_handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            error!("playback: failed to open audio output: {e}");
            let _ = ready_tx.send(Err(e.to_string()));
            return;
        }
    };
    let mut sink = match Sink::try_new(&stream_handle) {
        Ok(sink) => sink,
        Err(e) => {
            error!("playback: failed to create sink: {e}");
            let _ = ready_tx.send(Err(e.to_string()));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));
    info!("playback: audio output ready");

    let mut spatial: Vec<SpatialSink> = Vec::new();

    while let Ok(cmd) = cmd_rx.recv() {
        spatial.retain(|s| !s.empty());

        match cmd {
            PlayCmd::Play {
                waveform,
                target: Some(target),
            } => {
                let Some(clip) = clip(waveform) else {
                    continue;
                };
                match SpatialSink::try_new(
                    &stream_handle,
                    target.position,
                    listener.left_ear,
                    listener.right_ear,
                ) {
                    Ok(s) => {
                        debug!("playback: spatial clip at {:?}", target.position);
                        s.append(clip);
                        spatial.push(s);
                    }
                    Err(e) => error!("playback: failed to create spatial sink: {e}"),
                }
            }
            PlayCmd::Play {
                waveform,
                target: None,
            } => {
                if let Some(clip) = clip(waveform) {
                    debug!("playback: clip appended to sink");
                    sink.append(clip);
                }
            }
            PlayCmd::Listener(pose) => {
                listener = pose;
            }
            PlayCmd::Stop => {
                sink.stop();
                for s in spatial.drain(..) {
                    s.stop();
                }
                match Sink::try_new(&stream_handle) {
                    Ok(fresh) => sink = fresh,
                    Err(e) => {
                        error!("playback: failed to recreate sink: {e}");
                        break;
                    }
                }
            }
        }
    }

    sink.stop();
}
