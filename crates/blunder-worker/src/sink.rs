//! Where finished puzzles go

use std::io::Write;

use crate::error::WorkerError;
use crate::puzzle::BlunderPuzzle;

/// Receives each puzzle as soon as the pipeline creates it.
pub trait PuzzleSink {
    fn accept(&mut self, puzzle: &BlunderPuzzle) -> Result<(), WorkerError>;

    fn flush(&mut self) -> Result<(), WorkerError> {
        Ok(())
    }
}

impl PuzzleSink for Vec<BlunderPuzzle> {
    fn accept(&mut self, puzzle: &BlunderPuzzle) -> Result<(), WorkerError> {
        self.push(puzzle.clone());
        Ok(())
    }
}

/// One JSON object per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PuzzleSink for JsonLinesSink<W> {
    fn accept(&mut self, puzzle: &BlunderPuzzle) -> Result<(), WorkerError> {
        serde_json::to_writer(&mut self.writer, puzzle)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), WorkerError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl<S: PuzzleSink + ?Sized> PuzzleSink for &mut S {
    fn accept(&mut self, puzzle: &BlunderPuzzle) -> Result<(), WorkerError> {
        (**self).accept(puzzle)
    }

    fn flush(&mut self) -> Result<(), WorkerError> {
        (**self).flush()
    }
}
