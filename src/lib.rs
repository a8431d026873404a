/*!
 * # subburn - caption styling preview and burn-in export core
 *
 * A Rust library behind an animated-caption editor: it keeps a live preview
 * of the current caption style in sync with rapid edits, and drives batches
 * of server-side exports that burn the captions into video.
 *
 * ## Features
 *
 * - Content keys that only depend on what changes the rendered captions
 * - Bounded, time-expiring preview cache
 * - Debounced preview requests with abort-on-supersede
 * - Render-service color encoding (`&HAABBGGRR`) <-> editor colors
 * - Batch export with polling, aggregate progress, cancel, retry and download
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `app_controller`: Command line workflows
 * - `captions`: Caption cues and SRT ingestion
 * - `style`: Style model, color codec and cache keys:
 *   - `style::color`: native/UI color conversion
 *   - `style::key`: preview cache keys
 * - `preview`: Live preview pipeline:
 *   - `preview::cache`: artifact cache
 *   - `preview::coordinator`: request coordination
 * - `export`: Batch export models and orchestrator
 * - `services`: Render/export service interfaces, HTTP client and mocks
 * - `errors`: Custom error types for the library
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![cfg_attr(test, allow(non_snake_case))]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod captions;
pub mod errors;
pub mod export;
pub mod preview;
pub mod services;
pub mod style;

// Re-export main types for easier usage
pub use app_config::Config;
pub use captions::CaptionCue;
pub use errors::{AppError, CaptionError, ExportError, ServiceError};
pub use export::{BatchStatus, ExportBatch, ExportJob, ExportOrchestrator, ExportParams, JobStatus};
pub use preview::{PreviewCache, PreviewCoordinator, PreviewState, PreviewStatus};
pub use style::{compute_key, CacheKey, StyleDescriptor};
