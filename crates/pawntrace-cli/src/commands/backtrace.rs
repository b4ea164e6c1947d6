//! Backtrace command - rebuild a backtrace from a captured VM state

use super::{load_image, load_snapshot, print_json, script_name};
use anyhow::{Context, Result};
use pawntrace::{
    AmxImage, Backtrace, DebugInfo, FrameRenderer, NoModules, ResolvedFrame, Snapshot,
    BACKTRACE_HEADING,
};
use pawntrace_config::Config;
use std::path::Path;

/// A module image with a snapshot's memory and registers applied
pub struct Captured {
    pub image: AmxImage,
    pub snapshot: Snapshot,
    pub memory: Vec<u8>,
    pub debug: DebugInfo,
    pub script: String,
}

impl Captured {
    pub fn load(module: &Path, snapshot: &Path) -> Result<Self> {
        let image = load_image(module)?;
        let snapshot = load_snapshot(snapshot)?;
        let memory = snapshot
            .apply(image.data())
            .context("Snapshot does not match the module")?;
        // Backtraces degrade to raw addresses without debug info
        let debug = DebugInfo::from_image(&image).unwrap_or_default();

        Ok(Self {
            image,
            snapshot,
            memory,
            debug,
            script: script_name(module),
        })
    }

    pub fn renderer(&self, config: &Config) -> FrameRenderer<'_> {
        FrameRenderer::new(&self.debug)
            .with_limits(config.limits)
            .with_script_name(self.script.clone())
    }

    pub fn frames(&self, config: &Config) -> Vec<ResolvedFrame> {
        self.capture(config).resolve(&self.renderer(config))
    }

    /// Heading plus numbered frame lines
    pub fn lines(&self, config: &Config) -> Vec<String> {
        let mut lines = vec![BACKTRACE_HEADING.to_string()];
        lines.extend(self.capture(config).lines(&self.renderer(config)));
        lines
    }

    fn capture(&self, config: &Config) -> Backtrace<'_> {
        let amx = self.snapshot.amx_ref(&self.image, &self.memory);
        Backtrace::capture(
            amx,
            &self.snapshot.call_stack(),
            &NoModules,
            config.limits.max_depth,
        )
    }
}

pub fn run(module: &Path, snapshot: &Path, config: &Config, json: bool) -> Result<()> {
    let captured = Captured::load(module, snapshot)?;

    if json {
        return print_json(&captured.frames(config));
    }
    for line in captured.lines(config) {
        println!("{}", line);
    }
    Ok(())
}
