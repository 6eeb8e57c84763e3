//! Transform Plan Selector - quality tiers and their FFmpeg invocations
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::Path;

/// Quality tier requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Fast,   // Stream copy with time-scale adjustment, no re-encode
    Smooth, // 60 fps, light denoise/sharpen, x264 veryfast
    Ultra,  // Stronger filter chain, x264 fast, lower CRF
}

impl Tier {
    pub const DEFAULT: Tier = Tier::Fast;

    /// Parse a caller-supplied tier name. Unknown names fall back to `Fast`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "smooth" => Tier::Smooth,
            "ultra" => Tier::Ultra,
            _ => Tier::Fast,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Fast => "fast",
            Tier::Smooth => "smooth",
            Tier::Ultra => "ultra",
        }
    }

    /// Next higher-quality tier to suggest after a failure
    pub fn escalate(&self) -> Option<Tier> {
        match self {
            Tier::Fast => Some(Tier::Smooth),
            Tier::Smooth => Some(Tier::Ultra),
            Tier::Ultra => None,
        }
    }

    pub fn all() -> [Tier; 3] {
        [Tier::Fast, Tier::Smooth, Tier::Ultra]
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-function form of [`Tier::escalate`]
pub fn escalate(tier: Tier) -> Option<Tier> {
    tier.escalate()
}

/// One argument of an invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Literal(String),
    /// Replaced by the input file path
    Input,
    /// Replaced by the output file path
    Output,
}

impl Arg {
    pub fn lit(value: impl Into<String>) -> Self {
        Arg::Literal(value.into())
    }
}

/// Program plus structured argument list
///
/// Paths are passed as whole arguments, never spliced into strings, so no
/// shell or format interpretation happens on caller-controlled names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationTemplate {
    pub program: String,
    pub args: Vec<Arg>,
}

impl InvocationTemplate {
    pub fn new(program: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Concrete argument vector for the given paths
    pub fn render(&self, input: &Path, output: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg {
                Arg::Literal(value) => OsString::from(value),
                Arg::Input => input.as_os_str().to_os_string(),
                Arg::Output => output.as_os_str().to_os_string(),
            })
            .collect()
    }

    /// True when both path slots are present
    pub fn has_path_slots(&self) -> bool {
        self.args.contains(&Arg::Input) && self.args.contains(&Arg::Output)
    }
}

/// FFmpeg arguments for a tier
fn ffmpeg_args(tier: Tier) -> Vec<Arg> {
    let literals = |values: &[&str]| values.iter().map(|v| Arg::lit(*v)).collect::<Vec<_>>();

    match tier {
        Tier::Fast => {
            let mut args = literals(&["-y", "-itsscale", "2", "-i"]);
            args.push(Arg::Input);
            args.extend(literals(&["-c:v", "copy", "-c:a", "copy"]));
            args.push(Arg::Output);
            args
        }
        Tier::Smooth => {
            let mut args = literals(&["-y", "-i"]);
            args.push(Arg::Input);
            args.extend(literals(&[
                "-vf", "fps=60,hqdn3d=1.2:1.2:6:6,unsharp=5:5:0.7",
                "-c:v", "libx264", "-preset", "veryfast", "-crf", "18",
                "-pix_fmt", "yuv420p",
                "-c:a", "aac",
            ]));
            args.push(Arg::Output);
            args
        }
        Tier::Ultra => {
            let mut args = literals(&["-y", "-i"]);
            args.push(Arg::Input);
            args.extend(literals(&[
                "-vf", "fps=60,hqdn3d=1.5:1.5:8:8,unsharp=5:5:1.0",
                "-c:v", "libx264", "-preset", "fast", "-crf", "17",
                "-pix_fmt", "yuv420p",
                "-c:a", "aac",
            ]));
            args.push(Arg::Output);
            args
        }
    }
}

/// Tier → invocation mapping
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: HashMap<Tier, InvocationTemplate>,
}

impl PlanCatalog {
    /// Standard FFmpeg plans using the given executable
    pub fn ffmpeg(program: &str) -> Self {
        let plans = Tier::all()
            .into_iter()
            .map(|tier| (tier, InvocationTemplate::new(program, ffmpeg_args(tier))))
            .collect();
        Self { plans }
    }

    /// Override the template for one tier
    pub fn with_template(mut self, tier: Tier, template: InvocationTemplate) -> Self {
        self.plans.insert(tier, template);
        self
    }

    /// Use the same template for every tier
    pub fn uniform(template: InvocationTemplate) -> Self {
        let plans = Tier::all()
            .into_iter()
            .map(|tier| (tier, template.clone()))
            .collect();
        Self { plans }
    }

    pub fn resolve(&self, tier: Tier) -> &InvocationTemplate {
        // Every constructor fills all tiers
        &self.plans[&tier]
    }

    /// Resolve a caller-supplied tier name
    pub fn resolve_name(&self, name: &str) -> (Tier, &InvocationTemplate) {
        let tier = Tier::from_name(name);
        (tier, self.resolve(tier))
    }
}
