//! Resolves external data requirements into the evaluation context.

use std::{sync::Arc, time::Duration};

use tokio::time::timeout;

use crate::{
    context::{DataRequirements, EvaluationContext},
    providers::{GeoLookup, PersistentState, ProductSegmentationLookup, SegmentationLookup},
    Str,
};

/// Fetches each distinct data requirement at most once per pass and publishes
/// the results into the shared [`EvaluationContext`].
///
/// The three remote kinds (geo, customer segments, product segments) are
/// fetched concurrently; [`resolve`][Self::resolve] waits for every
/// outstanding fetch, bounded by `fetch_timeout`. A fetch that fails or times
/// out leaves its slot unresolved for the pass, so dependent predicates fail
/// closed instead of blocking the pipeline forever.
pub struct DependencyResolver {
    geo: Arc<dyn GeoLookup>,
    segmentation: Arc<dyn SegmentationLookup>,
    product_segmentation: Arc<dyn ProductSegmentationLookup>,
    state: Arc<dyn PersistentState>,
    fetch_timeout: Duration,
}

impl DependencyResolver {
    /// Default bound on a single fetch.
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(
        geo: Arc<dyn GeoLookup>,
        segmentation: Arc<dyn SegmentationLookup>,
        product_segmentation: Arc<dyn ProductSegmentationLookup>,
        state: Arc<dyn PersistentState>,
    ) -> DependencyResolver {
        DependencyResolver {
            geo,
            segmentation,
            product_segmentation,
            state,
            fetch_timeout: DependencyResolver::DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Replace the per-fetch timeout.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> DependencyResolver {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Satisfy `requirements` on `ctx`.
    ///
    /// Idempotent per pass: slots already attempted on this context are not
    /// re-fetched, which also lets a continuation of the same trigger-event
    /// handling reuse earlier results.
    pub async fn resolve(&self, requirements: &DataRequirements, ctx: &mut EvaluationContext) {
        if (requirements.needs_visit_count || requirements.needs_push_permission)
            && !ctx.resolved.local
        {
            ctx.visit_count = self.state.visit_count();
            ctx.push_permission = self.state.push_permission();
            ctx.resolved.local = true;
        }

        let want_geo = requirements.needs_geo && !ctx.resolved.geo;
        let want_segments = !requirements.segmentation_ids.is_empty() && !ctx.resolved.segments;
        let want_products =
            !requirements.product_segmentation_ids.is_empty() && !ctx.resolved.product_segments;

        if !(want_geo || want_segments || want_products) {
            return;
        }

        let segment_ids: Vec<Str> = requirements.segmentation_ids.iter().cloned().collect();
        let product_ids: Vec<Str> = requirements
            .product_segmentation_ids
            .iter()
            .cloned()
            .collect();

        // Join semantics: wait for every outstanding fetch, not just the
        // first, each independently bounded by the fetch timeout.
        let (geo, segments, products) = tokio::join!(
            async {
                if want_geo {
                    Some(timeout(self.fetch_timeout, self.geo.resolve()).await)
                } else {
                    None
                }
            },
            async {
                if want_segments {
                    Some(timeout(self.fetch_timeout, self.segmentation.check(&segment_ids)).await)
                } else {
                    None
                }
            },
            async {
                if want_products {
                    Some(
                        timeout(
                            self.fetch_timeout,
                            self.product_segmentation.check(&product_ids),
                        )
                        .await,
                    )
                } else {
                    None
                }
            },
        );

        if want_geo {
            ctx.resolved.geo = true;
            match geo {
                Some(Ok(Ok(result))) => ctx.geo = Some(result),
                Some(Ok(Err(err))) => {
                    log::warn!(target: "inapp", "geo lookup failed; geo predicates will not match: {err}");
                }
                Some(Err(_)) | None => {
                    log::warn!(target: "inapp", "geo lookup timed out; geo predicates will not match");
                }
            }
        }

        if want_segments {
            ctx.resolved.segments = true;
            match segments {
                Some(Ok(Ok(memberships))) => ctx.segments = Some(memberships),
                Some(Ok(Err(err))) => {
                    log::warn!(target: "inapp", "segmentation lookup failed; segment predicates will not match: {err}");
                }
                Some(Err(_)) | None => {
                    log::warn!(target: "inapp", "segmentation lookup timed out; segment predicates will not match");
                }
            }
        }

        if want_products {
            ctx.resolved.product_segments = true;
            match products {
                Some(Ok(Ok(memberships))) => ctx.product_segments = Some(memberships),
                Some(Ok(Err(err))) => {
                    log::warn!(target: "inapp", "product segmentation lookup failed; product predicates will not match: {err}");
                }
                Some(Err(_)) | None => {
                    log::warn!(target: "inapp", "product segmentation lookup timed out; product predicates will not match");
                }
            }
        }
    }
}
