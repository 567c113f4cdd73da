//! Compressify - Resumable Batch Media Compression
//!
//! Compresses directories of video and image files with ffmpeg, tracking
//! every file in a persisted job record so interrupted batches can be
//! paused, resumed and reported on without redoing finished work.

pub mod cli;
pub mod config;
pub mod error;
pub mod interactive;
pub mod job;
pub mod media;
pub mod profile;
