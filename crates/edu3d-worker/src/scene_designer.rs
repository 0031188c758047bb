//! 3D scene designer stage.
//!
//! Asks the model for a Blender Python script matching the analysis. The
//! script is run by `BlenderRunner`, which passes
//! `<frames_dir> <width> <height> <frames>` after `--`; when the model is
//! unavailable or returns something that is not a bpy script, the built-in
//! scene is used.

use tracing::{info, warn};

use edu3d_media::DEFAULT_SCENE_SCRIPT;
use edu3d_models::TopicAnalysis;

use crate::openai::{strip_code_fences, OpenAiClient};

const SYSTEM_PROMPT: &str = "You are an expert Blender 3D artist and Python programmer. \
Create Blender Python scripts for educational 3D visualizations. \
Return only Python code.";

/// Script handed to Blender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneScript {
    pub code: String,
    /// False when the built-in default scene is used
    pub from_model: bool,
}

impl SceneScript {
    pub fn builtin() -> Self {
        Self {
            code: DEFAULT_SCENE_SCRIPT.to_string(),
            from_model: false,
        }
    }
}

pub struct SceneDesigner {
    client: Option<OpenAiClient>,
}

impl SceneDesigner {
    pub fn new(client: Option<OpenAiClient>) -> Self {
        Self { client }
    }

    pub async fn design(&self, analysis: &TopicAnalysis) -> SceneScript {
        let Some(client) = &self.client else {
            return SceneScript::builtin();
        };

        match client.chat(SYSTEM_PROMPT, &build_prompt(analysis), false).await {
            Ok(raw) => match accept_script(&raw) {
                Some(code) => {
                    info!(chars = code.len(), "Scene script designed by model");
                    SceneScript {
                        code,
                        from_model: true,
                    }
                }
                None => {
                    warn!("Model response is not a Blender script, using built-in scene");
                    SceneScript::builtin()
                }
            },
            Err(e) => {
                warn!("Scene design failed, using built-in scene: {}", e);
                SceneScript::builtin()
            }
        }
    }
}

fn build_prompt(analysis: &TopicAnalysis) -> String {
    let concepts = analysis
        .concepts
        .iter()
        .map(|c| {
            format!(
                "- {}: {} (objects: {}; animations: {}; camera: {})",
                c.name,
                c.description,
                c.objects_3d.join(", "),
                c.animations.join(", "),
                c.camera_angles.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Create a Blender Python script for an educational animation about "{topic}" ({subject}, {level}).

Concepts:
{concepts}

Requirements:
1. Read arguments after "--" from sys.argv: output directory, width, height, frame count.
2. Clear the default scene, then add objects, materials, lighting and a camera.
3. Animate the objects across the frame range with keyframes.
4. Render a PNG sequence to <output directory>/frame_####.png using EEVEE.
5. Use only the bpy and standard library modules."#,
        topic = analysis.topic,
        subject = analysis.subject,
        level = analysis.level,
    )
}

/// Strip fences and keep the script only if it drives bpy.
fn accept_script(raw: &str) -> Option<String> {
    let code = strip_code_fences(raw);
    code.contains("import bpy").then(|| format!("{code}\n"))
}
