//! Combines every configured source into one deduplicated guide
//!
//! Order matters: local channels are registered before extra guides, and
//! sources are absorbed in configuration order, so the first registration of
//! a channel id and the first programme in a (start, channel) slot win.

use super::element::RawElement;
use super::extract::{extract, extract_standalone, Feed, FeedShape, TAG_CHANNEL};
use super::identity;
use crate::config::{ChannelSpec, ExtraSource, MergeConfig};
use crate::error::Result;
use crate::fetch::{fetch_all, Fetch};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Where a channel entry was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrigin {
    Local,
    Extra,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelElement {
    pub id: String,
    pub display_name: String,
    pub lang: String,
    pub logo: Option<String>,
    pub origin: ChannelOrigin,
}

/// An upstream programme, already stamped with its resolved channel id
#[derive(Debug, Clone, PartialEq)]
pub struct ProgrammeElement {
    pub channel: String,
    pub start: String,
    /// Display name of the configured channel that contributed it
    pub source: String,
    pub element: RawElement,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedDocument {
    pub channels: Vec<ChannelElement>,
    pub programmes: Vec<ProgrammeElement>,
}

impl MergedDocument {
    pub fn channel(&self, id: &str) -> Option<&ChannelElement> {
        self.channels.iter().find(|c| c.id == id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub programmes: usize,
    /// Dropped because their (start, channel) slot was already taken
    pub duplicates: usize,
    /// Extra-guide programmes for channels outside the allow-list
    pub filtered: usize,
    /// Programmes without a start attribute
    pub untimed: usize,
    /// Programmes whose channel has no channel entry
    pub unmapped: usize,
}

/// Mutable state for one merge run
#[derive(Default)]
struct Accumulator {
    channels: IndexMap<String, ChannelElement>,
    slots: IndexSet<(String, String)>,
    programmes: Vec<ProgrammeElement>,
    stats: MergeStats,
}

impl Accumulator {
    /// First registration of an id wins; later ones are ignored
    fn register_channel(&mut self, channel: ChannelElement) -> bool {
        if let Some(kept) = self.channels.get(&channel.id) {
            debug!(
                id = %channel.id,
                name = %channel.display_name,
                kept = ?kept.origin,
                skipped = ?channel.origin,
                "Channel id already registered, skipping"
            );
            return false;
        }
        self.channels.insert(channel.id.clone(), channel);
        true
    }

    fn add_programme(&mut self, mut element: RawElement, channel: &str, source: &str) {
        let Some(start) = element.attr("start").map(|s| s.into_owned()) else {
            self.stats.untimed += 1;
            return;
        };
        if !self.slots.insert((start.clone(), channel.to_string())) {
            self.stats.duplicates += 1;
            return;
        }
        element.stamp_attr("channel", channel);
        self.programmes.push(ProgrammeElement {
            channel: channel.to_string(),
            start,
            source: source.to_string(),
            element,
        });
    }

    fn absorb_local(&mut self, spec: &ChannelSpec, id: &str, feed: Feed) {
        if let [upstream] = feed.channels.as_slice() {
            self.backfill_logo(id, upstream);
        }
        for programme in feed.programmes {
            self.add_programme(programme, id, &spec.name);
        }
    }

    fn absorb_extra(&mut self, source: &ExtraSource, feed: Feed) {
        let allowed: HashMap<&str, &str> =
            source.channels.iter().map(|c| (c.id.as_str(), c.name.as_str())).collect();

        for programme in feed.programmes {
            let declared = programme
                .attr(TAG_CHANNEL)
                .and_then(|upstream| allowed.get_key_value(upstream.as_ref()).map(|(id, name)| (*id, *name)));
            match declared {
                Some((id, name)) => self.add_programme(programme, id, name),
                None => self.stats.filtered += 1,
            }
        }
    }

    /// Use the feed's own icon when the channel was declared without a logo
    fn backfill_logo(&mut self, id: &str, upstream: &RawElement) {
        let Some(channel) = self.channels.get_mut(id) else { return };
        if channel.logo.is_some() {
            return;
        }
        if let Some(src) = upstream.child("icon").and_then(|icon| icon.attr("src")) {
            if !src.is_empty() {
                channel.logo = Some(src.into_owned());
            }
        }
    }

    fn finish(mut self) -> (MergedDocument, MergeStats) {
        let channels = &self.channels;
        let before = self.programmes.len();
        self.programmes.retain(|p| channels.contains_key(&p.channel));
        self.stats.unmapped = before - self.programmes.len();
        self.stats.programmes = self.programmes.len();

        let doc = MergedDocument {
            channels: self.channels.into_values().collect(),
            programmes: self.programmes,
        };
        (doc, self.stats)
    }
}

/// Run the whole merge. Per-source failures are logged and skipped.
///
/// With `jobs > 1` downloads run concurrently, but feeds are still absorbed
/// in configuration order so the result does not depend on timing.
pub fn merge<F: Fetch + ?Sized>(config: &MergeConfig, fetcher: &F, jobs: usize) -> (MergedDocument, MergeStats) {
    let mut acc = Accumulator::default();

    let ids: Vec<String> = config.channels.iter().map(identity::resolve).collect();
    for (spec, id) in config.channels.iter().zip(&ids) {
        acc.register_channel(ChannelElement {
            id: id.clone(),
            display_name: spec.name.clone(),
            lang: spec.lang.clone(),
            logo: spec.logo.clone().filter(|logo| !logo.is_empty()),
            origin: ChannelOrigin::Local,
        });
    }
    for source in &config.extra_epg {
        for declared in &source.channels {
            acc.register_channel(ChannelElement {
                id: declared.id.clone(),
                display_name: declared.name.clone(),
                lang: source.lang.clone(),
                logo: declared.logo.clone().filter(|logo| !logo.is_empty()),
                origin: ChannelOrigin::Extra,
            });
        }
    }

    let urls: Vec<&str> = config
        .channels
        .iter()
        .map(|c| c.url.as_str())
        .chain(config.extra_epg.iter().map(|s| s.url.as_str()))
        .collect();
    let mut bodies: Box<dyn Iterator<Item = Result<String>> + '_> = if jobs > 1 {
        Box::new(fetch_all(fetcher, &urls, jobs).into_iter())
    } else {
        Box::new(urls.iter().map(|url| fetcher.fetch(url)))
    };

    for (spec, id) in config.channels.iter().zip(&ids) {
        let Some(body) = bodies.next() else { break };
        match body.and_then(|b| extract(&b)) {
            Ok((shape, feed)) => {
                log_feed(&spec.name, shape, &feed);
                acc.stats.sources_ok += 1;
                acc.absorb_local(spec, id, feed);
            }
            Err(e) => {
                warn!("Failed for {}: {}", spec.name, e);
                acc.stats.sources_failed += 1;
            }
        }
    }

    for source in &config.extra_epg {
        let Some(body) = bodies.next() else { break };
        match body.and_then(|b| extract_standalone(&b)) {
            Ok(feed) => {
                log_feed(&source.url, FeedShape::Standalone, &feed);
                acc.stats.sources_ok += 1;
                acc.absorb_extra(source, feed);
            }
            Err(e) => {
                warn!("Failed for extra EPG {}: {}", source.url, e);
                acc.stats.sources_failed += 1;
            }
        }
    }

    let (doc, stats) = acc.finish();
    info!(
        channels = doc.channels.len(),
        programmes = stats.programmes,
        duplicates = stats.duplicates,
        failed = stats.sources_failed,
        "Merge complete"
    );
    (doc, stats)
}

fn log_feed(source: &str, shape: FeedShape, feed: &Feed) {
    debug!(
        source,
        shape = shape.label(),
        channels = feed.channels.len(),
        programmes = feed.programmes.len(),
        "Extracted feed"
    );
}
