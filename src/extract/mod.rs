//! The reconstruction loop: builds a molecular graph from extracted lines
//! and labels, then repairs it until it stops changing or the restart
//! limit is reached.

pub mod bond_order;
pub mod charge;
pub mod components;
pub mod context;
pub mod dashes;
pub mod fusion;
pub mod initial;
pub mod regularize;
pub mod repair;
pub mod rescue;
pub mod ring_repair;
pub mod stereo;

pub use context::{GraphSummary, ReconstructionContext, Snapshot};

use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::collab::{Binarization, GlyphClassifier, LabelInterpreter, RasterPreprocessor};
use crate::config::ExtractConfig;
use crate::error::{ExtractError, PreprocessError};
use crate::labels::LabelDetector;
use crate::mol::MolecularGraph;
use crate::segments;
use crate::valence::check_valence;

/// The result of a successful reconstruction.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub graph: MolecularGraph,
    /// Graph copies per refinement step, in order. Empty unless
    /// `debug_snapshots` is set.
    pub snapshots: Vec<Snapshot>,
}

impl Extraction {
    pub fn summary(&self) -> GraphSummary {
        GraphSummary::of(&self.graph)
    }
}

pub struct Extractor<'a, P: RasterPreprocessor> {
    preprocessor: &'a P,
    classifier: &'a dyn GlyphClassifier,
    interpreter: &'a dyn LabelInterpreter,
    config: ExtractConfig,
    cancel: CancelToken,
}

impl<'a, P: RasterPreprocessor> Extractor<'a, P> {
    pub fn new(
        preprocessor: &'a P,
        classifier: &'a dyn GlyphClassifier,
        interpreter: &'a dyn LabelInterpreter,
    ) -> Self {
        Self {
            preprocessor,
            classifier,
            interpreter,
            config: ExtractConfig::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_config(mut self, config: ExtractConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A handle that interrupts a running `extract` from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Reconstructs the structure drawn in `image`, walking the
    /// binarization strategies until one is accepted. The last rejection
    /// is returned when all fail.
    pub fn extract(&self, image: &P::Image) -> Result<Extraction, ExtractError> {
        let strategies = [
            Binarization::Default,
            Binarization::Alternate,
            Binarization::Upscaled(self.config.limits.upscale_factor),
        ];
        let upscaled = strategies.len() - 1;
        let mut next = 0;
        let mut last = ExtractError::Preprocess(PreprocessError::TooSmall);
        while next < strategies.len() {
            let strategy = strategies[next];
            match self.extract_with(image, strategy) {
                Ok(extraction) => {
                    info!(
                        ?strategy,
                        nodes = extraction.graph.node_count(),
                        edges = extraction.graph.edge_count(),
                        "reconstructed structure"
                    );
                    return Ok(extraction);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(?strategy, error = %e, "binarization strategy rejected");
                    next = match e {
                        ExtractError::ImageTooSmall { .. } | ExtractError::Preprocess(PreprocessError::TooSmall)
                            if next < upscaled =>
                        {
                            upscaled
                        }
                        _ => next + 1,
                    };
                    last = e;
                }
            }
        }
        Err(last)
    }

    /// One full attempt with a fixed binarization strategy.
    pub fn extract_with(&self, image: &P::Image, strategy: Binarization) -> Result<Extraction, ExtractError> {
        self.cancel.check()?;
        let cfg = &self.config;
        let binary = self.preprocessor.binarize_and_clean(image, strategy)?;
        let thinned = self.preprocessor.thin(&binary);
        let regions = self.preprocessor.connected_components(&binary)?;
        if regions.len() > cfg.limits.max_regions {
            return Err(ExtractError::TooManyRegions {
                count: regions.len(),
                limit: cfg.limits.max_regions,
            });
        }
        let coarse = self.preprocessor.line_segments(&binary);
        let skeleton = self.preprocessor.line_segments(&thinned);
        let scale = segments::mean_length(&coarse);
        debug!(
            ?strategy,
            regions = regions.len(),
            coarse = coarse.len(),
            skeleton = skeleton.len(),
            scale,
            "preprocessed image"
        );

        let detector = LabelDetector::new(self.classifier, self.interpreter, &cfg.labels);
        let (segment_set, labels) = rayon::join(
            || segments::extract(&coarse, &skeleton, &cfg.segments),
            || detector.detect(&regions, &binary, scale, &self.cancel),
        );
        let labels = labels?;

        let mut ctx = ReconstructionContext::new(
            cfg,
            self.classifier,
            self.interpreter,
            &self.cancel,
            &binary,
            &regions,
            segment_set,
            labels,
        );
        reconstruct(&mut ctx)?;

        let abl = ctx.abl();
        if ctx.graph.edge_count() > 0 && abl < cfg.limits.min_average_bond_length {
            return Err(ExtractError::ImageTooSmall {
                average_bond_length: abl,
            });
        }
        Ok(Extraction {
            graph: ctx.graph,
            snapshots: ctx.snapshots,
        })
    }
}

fn longest_edge(graph: &MolecularGraph) -> f64 {
    graph.edges().map(|e| graph.edge_length(e)).fold(0.0, f64::max)
}

/// Builds the graph and settles the bond-length cutoff. Returns once the
/// longest edge fits or the round limit is reached.
fn settle(ctx: &mut ReconstructionContext<'_>) -> Result<(), ExtractError> {
    let cfg = ctx.config;
    let mut dashes_restarted = false;
    let mut round = 0;
    loop {
        ctx.cancel.check()?;
        initial::build(ctx);
        ctx.checkpoint("initial");

        let dashes = dashes::collapse(ctx);
        ctx.checkpoint("dashes");
        if let Some(min_segment) = dashes.new_min_segment {
            if !dashes_restarted {
                dashes_restarted = true;
                debug!(old = ctx.min_segment, new = min_segment, "raised minimum segment length");
                ctx.min_segment = min_segment;
                continue;
            }
        }

        fusion::ground_labels(ctx);
        fusion::add_missing_bonds(ctx);
        ctx.checkpoint("labels");

        ring_repair::repair(ctx);
        ctx.checkpoint("rings");

        let abl = ctx.abl();
        let longest = longest_edge(&ctx.graph);
        if round >= cfg.limits.max_bond_length_rounds || abl <= 0.0 || longest <= abl * cfg.graph.long_bond_ratio {
            return Ok(());
        }
        round += 1;
        let tightened = longest.min(ctx.max_bond_length) * cfg.graph.tighten_factor;
        debug!(round, longest, abl, cutoff = tightened, "tightened bond length cutoff");
        ctx.max_bond_length = tightened;
    }
}

/// Runs every refinement stage over `ctx.graph`, rebuilding from scratch
/// when a stage discovers labels or noise that change the input. The last
/// permitted pass always runs to completion.
pub fn reconstruct(ctx: &mut ReconstructionContext<'_>) -> Result<(), ExtractError> {
    let max_restarts = ctx.config.limits.max_restarts;
    for restart in 0..=max_restarts {
        ctx.cancel.check()?;
        ctx.restart = restart;
        let last = restart == max_restarts;

        settle(ctx)?;

        let rescued = rescue::rescue_unlabeled(ctx);
        ctx.checkpoint("rescue");
        if rescued > 0 && !last {
            info!(restart, rescued, "rebuilding with rescued labels");
            continue;
        }

        ctx.graph.clear_resolved();
        fusion::expand_fragments(ctx);
        ctx.checkpoint("fragments");
        repair::run(ctx);
        ctx.checkpoint("repair");
        bond_order::refine(ctx);
        ctx.checkpoint("bond_order");
        stereo::assign(ctx);
        ctx.checkpoint("stereo");
        charge::balance(ctx);
        ctx.checkpoint("charge");
        if let Err(errors) = check_valence(&ctx.graph) {
            debug!(violations = errors.len(), first = %errors[0], "valence violations remain");
        }

        if components::prune_noise(ctx) && !last {
            info!(restart, blacklisted = ctx.blacklist.len(), "rebuilding without noise");
            continue;
        }

        regularize::snap(ctx);
        ctx.checkpoint("regularize");
        debug!(
            restart,
            nodes = ctx.graph.node_count(),
            edges = ctx.graph.edge_count(),
            abl = ctx.abl(),
            "reconstruction converged"
        );
        return Ok(());
    }
    Ok(())
}
