// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Greedy clustering of timestamped events into bounded, separated windows
//!
//! Events are expected in ascending order; the result depends on insertion
//! order. Each cluster spans at most `max_span`, and the spans of two
//! different clusters always stay at least `min_gap` apart.

use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;

use ecodan_types::TimeRange;

/// An ordered time axis with a distance type
pub trait Timeline: Copy + Ord + fmt::Debug {
    type Span: Copy + Ord + fmt::Debug;

    fn span(start: Self, end: Self) -> Self::Span;

    fn forward(self, by: Self::Span) -> Self;

    fn backward(self, by: Self::Span) -> Self;
}

impl Timeline for i64 {
    type Span = i64;

    fn span(start: Self, end: Self) -> Self::Span {
        end - start
    }

    fn forward(self, by: Self::Span) -> Self {
        self + by
    }

    fn backward(self, by: Self::Span) -> Self {
        self - by
    }
}

impl Timeline for DateTime<Utc> {
    type Span = TimeDelta;

    fn span(start: Self, end: Self) -> Self::Span {
        end - start
    }

    fn forward(self, by: Self::Span) -> Self {
        self + by
    }

    fn backward(self, by: Self::Span) -> Self {
        self - by
    }
}

/// Anything that can be placed on a timeline
pub trait Timestamped {
    type Time: Timeline;

    fn timestamp(&self) -> Self::Time;
}

impl Timestamped for i64 {
    type Time = i64;

    fn timestamp(&self) -> i64 {
        *self
    }
}

impl Timestamped for DateTime<Utc> {
    type Time = DateTime<Utc>;

    fn timestamp(&self) -> DateTime<Utc> {
        *self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterConfig<S> {
    pub max_clusters: usize,
    pub max_span: S,
    pub min_gap: S,
}

/// Bag of events with derived bounds
#[derive(Debug, Clone)]
pub struct Cluster<E: Timestamped> {
    events: Vec<E>,
    start: E::Time,
    end: E::Time,
}

impl<E: Timestamped> Cluster<E> {
    fn single(event: E) -> Self {
        let t = event.timestamp();
        Self {
            events: vec![event],
            start: t,
            end: t,
        }
    }

    pub fn start(&self) -> E::Time {
        self.start
    }

    pub fn end(&self) -> E::Time {
        self.end
    }

    pub fn events(&self) -> &[E] {
        &self.events
    }

    pub fn contains(&self, t: E::Time) -> bool {
        self.start <= t && t <= self.end
    }

    fn push(&mut self, event: E) {
        let t = event.timestamp();
        self.start = self.start.min(t);
        self.end = self.end.max(t);
        self.events.push(event);
    }
}

/// At most `max_clusters` clusters, each no wider than `max_span`, pairwise `min_gap` apart
#[derive(Debug, Clone)]
pub struct ClusterSet<E: Timestamped> {
    config: ClusterConfig<<E::Time as Timeline>::Span>,
    clusters: Vec<Cluster<E>>,
}

impl<E: Timestamped> ClusterSet<E> {
    pub fn new(config: ClusterConfig<<E::Time as Timeline>::Span>) -> Self {
        Self {
            config,
            clusters: Vec::new(),
        }
    }

    /// Ingest one event, returning whether any cluster took it
    pub fn add(&mut self, event: E) -> bool {
        let t = event.timestamp();

        for index in 0..self.clusters.len() {
            let cluster = &self.clusters[index];
            if cluster.contains(t) {
                self.clusters[index].push(event);
                return true;
            }

            let start = cluster.start.min(t);
            let end = cluster.end.max(t);
            if <E::Time as Timeline>::span(start, end) <= self.config.max_span
                && self.is_separated(start, end, Some(index))
            {
                self.clusters[index].push(event);
                return true;
            }
        }

        if self.clusters.len() < self.config.max_clusters && self.is_separated(t, t, None) {
            self.clusters.push(Cluster::single(event));
            return true;
        }

        false
    }

    /// No cluster other than `skip` lies within `min_gap` of `[start, end]`, bounds included
    fn is_separated(&self, start: E::Time, end: E::Time, skip: Option<usize>) -> bool {
        let padded_start = start.backward(self.config.min_gap);
        let padded_end = end.forward(self.config.min_gap);

        self.clusters
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != skip)
            .all(|(_, other)| !(padded_start <= other.end && padded_end >= other.start))
    }

    pub fn clusters(&self) -> &[Cluster<E>] {
        &self.clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Cluster bounds ordered by start
    pub fn windows(&self) -> Vec<(E::Time, E::Time)> {
        let mut windows: Vec<_> = self.clusters.iter().map(|c| (c.start, c.end)).collect();
        windows.sort();
        windows
    }
}

/// One forecast production sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductionSample {
    pub timestamp: DateTime<Utc>,
    pub power_kw: f64,
}

impl Timestamped for ProductionSample {
    type Time = DateTime<Utc>;

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Cluster the samples producing at least `min_power_kw` into admissible windows
pub fn production_windows(
    samples: &[ProductionSample],
    min_power_kw: f64,
    config: ClusterConfig<TimeDelta>,
) -> Vec<ClusteredWindow> {
    let mut productive: Vec<ProductionSample> = samples
        .iter()
        .copied()
        .filter(|sample| sample.power_kw >= min_power_kw)
        .collect();
    productive.sort_by_key(|sample| sample.timestamp);

    let mut set = ClusterSet::new(config);
    for sample in productive {
        if !set.add(sample) {
            tracing::trace!(at = %sample.timestamp, "Production sample outside any window");
        }
    }

    let mut windows: Vec<ClusteredWindow> = set
        .clusters()
        .iter()
        .map(|cluster| ClusteredWindow {
            range: TimeRange::new(cluster.start(), cluster.end()),
            samples: cluster.events().to_vec(),
        })
        .collect();
    windows.sort_by_key(|window| window.range.start);
    windows
}

/// A production window with the samples that formed it
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteredWindow {
    pub range: TimeRange,
    pub samples: Vec<ProductionSample>,
}

impl ClusteredWindow {
    /// Energy of the window, each sample standing for `sample_interval`
    pub fn energy_kwh(&self, sample_interval: TimeDelta) -> f64 {
        let hours = sample_interval.as_seconds_f64() / 3600.0;
        self.samples.iter().map(|s| s.power_kw * hours).sum()
    }
}
