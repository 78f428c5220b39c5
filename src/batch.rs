//! # Batch Renderer
//!
//! Renders one card per record with bounded concurrency and a per-index
//! result cache.
//!
//! - Cards are rendered in windows of `batch_window` (default 5). A window
//!   runs its renders concurrently and the next window starts only after the
//!   whole window settles. A card loads its own images one at a time, so at
//!   most `batch_window` image fetches or decodes are in flight.
//! - Callers can ask for just the indices they need
//!   ([`BatchRenderer::render_indices`]); finished cards are cached by index.
//! - The cache keeps at most [`CARD_CACHE_LIMIT`] cards (configurable with
//!   [`BatchRenderer::with_cache_limit`]); the oldest cached card goes first.
//! - Any change of inputs bumps a generation counter and clears the cache.
//!   Renders already in flight finish, but their results belong to the old
//!   generation and are not cached.
//!
//! The lock is never held across an await, so invalidation is never blocked
//! behind a slow image download.

use futures::future::join_all;
use log::{debug, info};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{CardpressError, Result};
use crate::record::Record;
use crate::render::{CardImage, RenderEngine};
use crate::template::Template;

/// Default number of rendered cards kept between requests.
pub const CARD_CACHE_LIMIT: usize = 256;

struct BatchState {
    generation: u64,
    template: Arc<Template>,
    records: Arc<Vec<Record>>,
    cache: HashMap<usize, Arc<CardImage>>,
    order: VecDeque<usize>,
}

impl BatchState {
    fn clear(&mut self) {
        self.cache.clear();
        self.order.clear();
    }

    fn remember(&mut self, index: usize, card: Arc<CardImage>, limit: usize) {
        if limit == 0 {
            return;
        }
        if self.cache.insert(index, card).is_none() {
            self.order.push_back(index);
        }
        while self.order.len() > limit {
            if let Some(oldest) = self.order.pop_front() {
                self.cache.remove(&oldest);
            }
        }
    }
}

/// Order-preserving, windowed, cached card rendering.
pub struct BatchRenderer {
    engine: RenderEngine,
    cache_limit: usize,
    state: Mutex<BatchState>,
}

impl BatchRenderer {
    pub fn new(engine: RenderEngine) -> Self {
        Self {
            engine,
            cache_limit: CARD_CACHE_LIMIT,
            state: Mutex::new(BatchState {
                generation: 0,
                template: Arc::new(Template::default()),
                records: Arc::new(Vec::new()),
                cache: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Keep at most `cards` rendered cards in the cache.
    pub fn with_cache_limit(mut self, cards: usize) -> Self {
        self.cache_limit = cards;
        self
    }

    pub fn engine(&self) -> &RenderEngine {
        &self.engine
    }

    /// Replace the template and records. Drops every cached card.
    pub async fn set_inputs(&self, template: Template, records: Vec<Record>) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.template = Arc::new(template);
        state.records = Arc::new(records);
        state.clear();
        debug!("[batch] inputs replaced (generation {})", state.generation);
    }

    /// Drop every cached card without changing the inputs.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.generation += 1;
        state.clear();
    }

    /// Number of records in the current batch.
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of cards currently cached.
    pub async fn cached_count(&self) -> usize {
        self.state.lock().await.cache.len()
    }

    /// Render (or fetch from cache) a single card.
    pub async fn render_index(&self, index: usize) -> Result<Arc<CardImage>> {
        let mut cards = self.render_indices(&[index]).await?;
        cards
            .pop()
            .ok_or_else(|| CardpressError::Render(format!("card {} was not rendered", index)))
    }

    /// Render every card, in record order.
    pub async fn render_all(&self) -> Result<Vec<Arc<CardImage>>> {
        let indices: Vec<usize> = (0..self.len().await).collect();
        self.render_indices(&indices).await
    }

    /// Render the requested cards, returning them in the order requested.
    ///
    /// Cached cards are returned as-is; the rest are rendered in windows.
    pub async fn render_indices(&self, indices: &[usize]) -> Result<Vec<Arc<CardImage>>> {
        let (generation, template, records, mut done) = {
            let state = self.state.lock().await;
            if let Some(&bad) = indices.iter().find(|&&i| i >= state.records.len()) {
                return Err(CardpressError::NotFound(format!(
                    "card index {} out of range ({} cards)",
                    bad,
                    state.records.len()
                )));
            }
            let hits: HashMap<usize, Arc<CardImage>> = indices
                .iter()
                .filter_map(|i| state.cache.get(i).map(|card| (*i, card.clone())))
                .collect();
            (state.generation, state.template.clone(), state.records.clone(), hits)
        };

        let mut missing: Vec<usize> = Vec::new();
        for &i in indices {
            if !done.contains_key(&i) && !missing.contains(&i) {
                missing.push(i);
            }
        }

        if !missing.is_empty() {
            info!(
                "[batch] rendering {} card(s) in windows of {}",
                missing.len(),
                self.engine.config().window()
            );
        }

        for window in missing.chunks(self.engine.config().window()) {
            let renders = window.iter().map(|&i| {
                let template = &template;
                let records = &records;
                async move { (i, self.engine.render_one(template, &records[i]).await) }
            });
            let finished = join_all(renders).await;

            let mut fresh = Vec::with_capacity(finished.len());
            for (i, result) in finished {
                fresh.push((i, Arc::new(result?)));
            }

            {
                let mut state = self.state.lock().await;
                if state.generation == generation {
                    for (i, card) in &fresh {
                        state.remember(*i, card.clone(), self.cache_limit);
                    }
                } else {
                    debug!("[batch] discarding {} stale card(s)", fresh.len());
                }
            }
            done.extend(fresh);

            // let other tasks run between windows
            tokio::task::yield_now().await;
        }

        indices
            .iter()
            .map(|i| {
                done.get(i)
                    .cloned()
                    .ok_or_else(|| CardpressError::Render(format!("card {} was not rendered", i)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::render::font::FontBook;
    use crate::render::loader::ImageSource;
    use crate::template::{DynamicImage as DynamicImageElement, Element, Frame};
    use async_trait::async_trait;
    use image::{DynamicImage, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Image source that sleeps a source-dependent time and tracks how many
    /// loads overlap.
    #[derive(Default)]
    struct SlowImages {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl ImageSource for SlowImages {
        async fn load(&self, src: &str) -> Result<Arc<DynamicImage>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.loads.fetch_add(1, Ordering::SeqCst);

            // later cards finish first within a window
            let n: u64 = src.trim_start_matches("art-").parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(30 - n * 2)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Arc::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])))))
        }
    }

    fn template() -> Template {
        Template::new(50.0, 50.0).with_element(Element::DynamicImage(DynamicImageElement {
            frame: Frame::new("art", 0.0, 0.0, 50.0, 50.0),
            bind: Some("art".into()),
            src: None,
        }))
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| json!({ "art": format!("art-{}", i) }).as_object().cloned().unwrap())
            .collect()
    }

    fn renderer(images: Arc<SlowImages>) -> BatchRenderer {
        let config = RenderConfig {
            pixel_ratio: 1.0,
            batch_window: 5,
            ..Default::default()
        };
        BatchRenderer::new(RenderEngine::new(config, FontBook::empty(), images))
    }

    fn art(card: &CardImage) -> &str {
        card.layout.element("art").and_then(|e| e.image_source()).unwrap()
    }

    #[tokio::test]
    async fn twelve_records_in_order_with_bounded_window() {
        let images = Arc::new(SlowImages::default());
        let batch = renderer(images.clone());
        batch.set_inputs(template(), records(12)).await;

        let cards = batch.render_all().await.unwrap();
        assert_eq!(cards.len(), 12);
        let sources: Vec<&str> = cards.iter().map(|c| art(c)).collect();
        let expected: Vec<String> = (0..12).map(|i| format!("art-{}", i)).collect();
        assert_eq!(sources, expected);

        let max = images.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 5, "{} loads overlapped", max);
        assert!(max > 1, "window did not run concurrently");
    }

    #[tokio::test]
    async fn loads_in_flight_never_exceed_the_window() {
        let layered = ["art", "frame", "badge"].iter().fold(Template::new(50.0, 50.0), |t, id| {
            t.with_element(Element::DynamicImage(DynamicImageElement {
                frame: Frame::new(*id, 0.0, 0.0, 50.0, 50.0),
                bind: Some("art".into()),
                src: None,
            }))
        });
        let images = Arc::new(SlowImages::default());
        let batch = renderer(images.clone());
        batch.set_inputs(layered, records(12)).await;

        batch.render_all().await.unwrap();
        assert_eq!(images.loads.load(Ordering::SeqCst), 36);
        let max = images.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 5, "{} loads overlapped", max);
    }

    #[tokio::test]
    async fn lazy_indices_are_cached() {
        let images = Arc::new(SlowImages::default());
        let batch = renderer(images.clone());
        batch.set_inputs(template(), records(8)).await;

        let first = batch.render_indices(&[6, 2]).await.unwrap();
        assert_eq!(art(&first[0]), "art-6");
        assert_eq!(art(&first[1]), "art-2");
        assert_eq!(batch.cached_count().await, 2);

        let again = batch.render_index(6).await.unwrap();
        assert!(Arc::ptr_eq(&first[0], &again));
        assert_eq!(images.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn card_cache_keeps_only_the_newest_cards() {
        let images = Arc::new(SlowImages::default());
        let batch = renderer(images.clone()).with_cache_limit(4);
        batch.set_inputs(template(), records(10)).await;

        let cards = batch.render_all().await.unwrap();
        assert_eq!(cards.len(), 10);
        assert_eq!(batch.cached_count().await, 4);
        assert_eq!(images.loads.load(Ordering::SeqCst), 10);

        // 6..10 are still cached, 0 renders again
        batch.render_indices(&[9, 6]).await.unwrap();
        assert_eq!(images.loads.load(Ordering::SeqCst), 10);
        batch.render_index(0).await.unwrap();
        assert_eq!(images.loads.load(Ordering::SeqCst), 11);
        assert_eq!(batch.cached_count().await, 4);
    }

    #[tokio::test]
    async fn new_inputs_invalidate_everything() {
        let images = Arc::new(SlowImages::default());
        let batch = renderer(images.clone());
        batch.set_inputs(template(), records(3)).await;
        batch.render_all().await.unwrap();
        assert_eq!(batch.cached_count().await, 3);

        batch.set_inputs(template(), records(2)).await;
        assert_eq!(batch.cached_count().await, 0);
        assert_eq!(batch.len().await, 2);

        batch.render_all().await.unwrap();
        batch.invalidate().await;
        assert_eq!(batch.cached_count().await, 0);
    }

    #[tokio::test]
    async fn in_flight_results_of_old_inputs_are_not_cached() {
        let images = Arc::new(SlowImages::default());
        let batch = renderer(images);
        batch.set_inputs(template(), records(2)).await;

        let (stale, ()) = tokio::join!(batch.render_index(0), async {
            tokio::task::yield_now().await;
            batch.set_inputs(template(), records(2)).await;
        });
        // the caller still gets its card, the cache does not
        assert_eq!(art(&stale.unwrap()), "art-0");
        assert_eq!(batch.cached_count().await, 0);
    }

    #[tokio::test]
    async fn out_of_range_index_is_an_error() {
        let batch = renderer(Arc::new(SlowImages::default()));
        batch.set_inputs(template(), records(1)).await;
        assert!(matches!(batch.render_index(1).await, Err(CardpressError::NotFound(_))));
        assert!(batch.render_indices(&[]).await.unwrap().is_empty());
    }
}
