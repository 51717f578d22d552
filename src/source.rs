//! Call audio source.
//!
//! The voice engine pulls one frame of samples per tick through
//! [SampleSource::fill_buffer] while the control side queues files, clears
//! the queue or swaps the hold list. Both sides share a single
//! [BookkeepingLock]; the audio thread only holds it to pick the next entry
//! or to hand the active stream back, never while a file is opened, read or
//! closed.

use crate::{
    constants::BYTES_PER_SAMPLE,
    lock::BookkeepingLock,
    queue::{NextSource, Origin, PlayQueues},
};
use anyhow::{anyhow, Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use itertools::Itertools;
use serde::Serialize;
use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

/// Upper bound on files opened by a single tick. Each open is a syscall on
/// the real-time thread, so a list of tiny files plays with gaps rather
/// than opening once per sample.
pub const MAX_OPENS_PER_TICK: usize = 8;

/// An open raw sample file, 16-bit little-endian in the engine's format.
pub struct SampleStream {
    path: PathBuf,
    file: File,
    scratch: Vec<u8>,
}

impl SampleStream {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            scratch: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads up to `out.len()` samples. Fewer samples than requested means
    /// the end of the file was reached. Read errors count as end of file.
    pub fn read_samples(&mut self, out: &mut [i16]) -> usize {
        let wanted = out.len() * BYTES_PER_SAMPLE;
        self.scratch.resize(wanted, 0);

        let mut got = 0;
        while got < wanted {
            match self.file.read(&mut self.scratch[got..wanted]) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("Error while reading {}: {:?}", self.path.display(), e);
                    break;
                }
            }
        }

        // A dangling odd byte at the end of a file is dropped
        let samples = got / BYTES_PER_SAMPLE;
        LittleEndian::read_i16_into(
            &self.scratch[..samples * BYTES_PER_SAMPLE],
            &mut out[..samples],
        );

        samples
    }
}

/// The stream currently feeding the call, tagged with where it came from.
#[derive(Default)]
pub enum ActiveStream {
    #[default]
    None,
    QueueItem(SampleStream),
    HoldItem(SampleStream),
}

impl ActiveStream {
    fn from_parts(origin: Origin, stream: SampleStream) -> Self {
        match origin {
            Origin::Queue => ActiveStream::QueueItem(stream),
            Origin::Hold => ActiveStream::HoldItem(stream),
        }
    }

    fn into_parts(self) -> Option<(Origin, SampleStream)> {
        match self {
            ActiveStream::None => None,
            ActiveStream::QueueItem(stream) => Some((Origin::Queue, stream)),
            ActiveStream::HoldItem(stream) => Some((Origin::Hold, stream)),
        }
    }

    pub fn origin(&self) -> Option<Origin> {
        match self {
            ActiveStream::None => None,
            ActiveStream::QueueItem(_) => Some(Origin::Queue),
            ActiveStream::HoldItem(_) => Some(Origin::Hold),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ActiveStream::None => None,
            ActiveStream::QueueItem(stream) | ActiveStream::HoldItem(stream) => {
                Some(stream.path())
            }
        }
    }
}

/// A stream borrowed by the audio thread for the duration of one tick.
struct Lease {
    origin: Origin,
    stream: SampleStream,

    /// Queue epoch at the time the stream was handed out
    epoch: u64,
}

enum TickStart {
    /// Call isn't established (or already torn down), leave the buffer alone
    Skip,

    /// Another tick is still in flight
    Busy,

    Go(Option<Lease>),
}

#[derive(Default)]
struct SourceState {
    queues: PlayQueues,
    active: ActiveStream,

    /// Origin and path of the stream currently lent to the audio thread
    lent: Option<(Origin, PathBuf)>,

    /// Bumped by every stop, so that a queue stream which was lent out
    /// while the queue got cleared isn't handed back
    queue_epoch: u64,

    tick_in_progress: bool,
    established: bool,
    shut_down: bool,
}

impl SourceState {
    fn begin_tick(&mut self) -> TickStart {
        if !self.established || self.shut_down {
            return TickStart::Skip;
        }
        if self.tick_in_progress {
            return TickStart::Busy;
        }

        self.tick_in_progress = true;

        let lease = std::mem::take(&mut self.active)
            .into_parts()
            .map(|(origin, stream)| Lease {
                origin,
                stream,
                epoch: self.queue_epoch,
            });
        self.lent = lease
            .as_ref()
            .map(|lease| (lease.origin, lease.stream.path().to_path_buf()));

        TickStart::Go(lease)
    }

    /// Picks the next entry for the running tick. Gives up once more hold
    /// entries in a row produced nothing than the hold list is long, so a
    /// hold list of empty or missing files can't spin the audio thread.
    fn next_for_tick(&mut self, empty_holds: usize) -> Option<(NextSource, u64)> {
        self.lent = None;

        if self.shut_down {
            return None;
        }
        if self.queues.play_len() == 0 && empty_holds > self.queues.hold_len() {
            return None;
        }

        let next = self.queues.next_source()?;
        self.lent = Some((next.origin, next.path.clone()));

        Some((next, self.queue_epoch))
    }

    /// Hands the stream back after a tick. Returns it instead when it went
    /// stale in the meantime, so the caller can close it outside the lock.
    fn end_tick(&mut self, lease: Option<Lease>) -> Option<SampleStream> {
        self.tick_in_progress = false;
        self.lent = None;

        let lease = lease?;
        let stale = self.shut_down
            || (lease.origin == Origin::Queue && lease.epoch != self.queue_epoch);

        if stale {
            Some(lease.stream)
        } else {
            self.active = ActiveStream::from_parts(lease.origin, lease.stream);
            None
        }
    }

    fn current_origin(&self) -> Option<Origin> {
        self.active
            .origin()
            .or_else(|| self.lent.as_ref().map(|(origin, _)| *origin))
    }

    fn current_path(&self) -> Option<&Path> {
        self.active
            .path()
            .or_else(|| self.lent.as_ref().map(|(_, path)| path.as_path()))
    }

    fn is_playing(&self) -> bool {
        self.current_origin() == Some(Origin::Queue)
    }
}

/// Serializable view of the source, used for debug output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceSnapshot {
    pub established: bool,
    pub shut_down: bool,
    pub playing: bool,
    pub active_origin: Option<Origin>,
    pub active_path: Option<String>,
    pub queue: Vec<String>,
    pub hold: Vec<String>,
}

#[derive(Default)]
pub struct SampleSource {
    state: BookkeepingLock<SourceState>,
}

impl SampleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills `buf` with the next samples for the call. Runs on the engine's
    /// real-time thread and never fails: anything that goes wrong turns into
    /// silence for the rest of the buffer.
    pub fn fill_buffer(&self, buf: &mut [i16]) {
        if buf.is_empty() {
            return;
        }

        let mut current = match self.state.with(|s| s.begin_tick()) {
            TickStart::Skip => return,
            TickStart::Busy => {
                buf.fill(0);
                return;
            }
            TickStart::Go(lease) => lease,
        };

        let mut filled = 0;
        let mut empty_holds = 0;
        let mut opens = 0;

        loop {
            if let Some(lease) = current.as_mut() {
                let read = lease.stream.read_samples(&mut buf[filled..]);
                filled += read;

                if filled == buf.len() {
                    break;
                }

                // End of file, close it before picking the next entry
                if let Some(done) = current.take() {
                    if read > 0 {
                        empty_holds = 0;
                    } else if done.origin == Origin::Hold {
                        empty_holds += 1;
                    }
                    trace!("Finished {}", done.stream.path().display());
                }
            }

            if opens == MAX_OPENS_PER_TICK {
                trace!("Opened {opens} files this tick, leaving the rest silent");
                break;
            }

            let Some((next, epoch)) = self.state.with(|s| s.next_for_tick(empty_holds)) else {
                break;
            };
            opens += 1;

            match SampleStream::open(&next.path) {
                Ok(stream) => {
                    trace!("Opened {}", next.path.display());
                    current = Some(Lease {
                        origin: next.origin,
                        stream,
                        epoch,
                    });
                }
                Err(e) => {
                    debug!("Skipping {}: {:?}", next.path.display(), e);
                    if next.origin == Origin::Hold {
                        empty_holds += 1;
                    }
                }
            }
        }

        buf[filled..].fill(0);

        let stale = self.state.with(|s| s.end_tick(current));
        drop(stale);
    }

    /// Queues a file for one-shot playback after checking that it opens.
    pub fn enqueue_play(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let file =
            File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
        let is_file = file
            .metadata()
            .with_context(|| format!("Cannot stat {}", path.display()))?
            .is_file();
        drop(file);

        if !is_file {
            return Err(anyhow!("{} is not a file", path.display()));
        }

        let queued = self.state.with(|s| {
            if s.shut_down {
                return None;
            }
            s.queues.push_play(path.to_path_buf());
            Some(s.queues.play_len())
        });

        match queued {
            Some(len) => {
                info!("Queued {}, queue length: {len}", path.display());
                Ok(())
            }
            None => Err(anyhow!(
                "Call has ended, not queueing {}",
                path.display()
            )),
        }
    }

    /// Queues every path in order, skipping the ones that can't be opened.
    /// Returns how many were queued.
    pub fn enqueue_play_many<I, P>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths
            .into_iter()
            .filter(|path| match self.enqueue_play(path) {
                Ok(()) => true,
                Err(e) => {
                    warn!("{e:#}");
                    false
                }
            })
            .count()
    }

    /// Clears the play queue and stops the queue item that is playing.
    /// Hold playback carries on.
    pub fn stop_all(&self) {
        let (dropped, stopped) = self.state.with(|s| {
            let dropped = s.queues.clear_play();
            s.queue_epoch += 1;

            if matches!(s.lent, Some((Origin::Queue, _))) {
                s.lent = None;
            }

            let stopped = match std::mem::take(&mut s.active) {
                ActiveStream::QueueItem(stream) => Some(stream),
                other => {
                    s.active = other;
                    None
                }
            };

            (dropped, stopped)
        });

        info!(
            "Stopped playback, dropped {dropped} queued files{}",
            if stopped.is_some() {
                " and the current one"
            } else {
                ""
            }
        );

        drop(stopped);
    }

    /// Replaces the hold list. A hold file that is already playing finishes
    /// normally, the new list takes over from the next rotation.
    pub fn set_hold_list<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let paths: Vec<PathBuf> = paths
            .into_iter()
            .map(|path| path.as_ref().to_path_buf())
            .collect();

        info!(
            "New hold list: [{}]",
            paths.iter().map(|path| path.display()).join(", ")
        );

        self.state.with(|s| {
            if !s.shut_down {
                s.queues.replace_hold(paths);
            }
        });
    }

    /// Opens or closes the gate that lets ticks produce samples.
    pub fn set_established(&self, established: bool) {
        self.state.with(|s| s.established = established && !s.shut_down);
    }

    /// Drops both queues and the active stream for good. Later ticks leave
    /// the buffer alone and later control calls do nothing.
    pub fn shutdown(&self) {
        let active = self.state.with(|s| {
            s.shut_down = true;
            s.established = false;
            s.queue_epoch += 1;
            s.queues.clear();
            std::mem::take(&mut s.active)
        });

        drop(active);
    }

    pub fn is_playing(&self) -> bool {
        self.state.with(|s| s.is_playing())
    }

    pub fn snapshot(&self) -> SourceSnapshot {
        self.state.with(|s| SourceSnapshot {
            established: s.established,
            shut_down: s.shut_down,
            playing: s.is_playing(),
            active_origin: s.current_origin(),
            active_path: s.current_path().map(|path| path.display().to_string()),
            queue: s
                .queues
                .play_entries()
                .map(|path| path.display().to_string())
                .collect(),
            hold: s
                .queues
                .hold_entries()
                .map(|path| path.display().to_string())
                .collect(),
        })
    }
}
