//! Fixed prompt text and parameters applied by the proxy before dispatching to
//! the providers.
//!
//! The proxy owns these values; they are mirrored here so the CLI can show
//! exactly what a harmonization request will ask for.

/// Directive every harmonization request starts with.
pub const HARMONIZATION_DIRECTIVE: &str = "Task:
The provided image contains multiple elements combined from various sources, each with potentially different lighting, color temperature, perspective, scale, shadows, or artistic styles. Your task is to harmonize and seamlessly blend these elements into a single, coherent image.

Instructions:

Consistency:
Ensure all elements appear as if they were naturally photographed or created together at the same moment, in the same environment, sharing unified lighting, shadows, reflections, color temperature, saturation, contrast, perspective, and spatial coherence.

Accuracy and Similarity:
Closely match the structure, layout, positioning, and proportions from the provided input image. Your harmonized output should appear as a perfected, coherent version of the original layout.

Naturalness:
Adjust elements minimally yet effectively to ensure the final composition looks natural, believable, and visually consistent. Pay particular attention to shadows, highlights, reflections, edges, and transitions between elements, correcting inconsistencies without compromising the original content. Do not let any object look like a 2D cut-out.

Identity:
Make sure to preserve the identity of people, objects, etc. This means that in the output image, faces of people should be completely recognizable without alteration of their distinctive features or expressions, and objects should maintain their original details, proportions, textures, and recognizable characteristics. While they will be blended and harmonized into a single coherent image with correct lighting, shadows, color temperature, perspective, reflections, etc., they should retain their inherent visual identity and original attributes, because the primary goal is visual coherence and realism without compromising recognizability.

Goal:
Deliver a high-quality, harmonized image that convincingly appears as a single coherent composition, while maintaining fidelity to the original image content and arrangement. The goal is for the output image to look as an image that was photographed / created at once, naturally.";

/// Closing clause appended after user instructions, or on its own.
const DEPTH_CLAUSE: &str = "Make sure all objects have proper shadows and depth";

/// Image quality requested from the harmonization provider.
pub const HARMONIZE_QUALITY: &str = "medium";

/// Square resolution used for text-to-image generation.
pub const GENERATION_SIZE: u32 = 1024;

/// Inference steps used for text-to-image generation.
pub const GENERATION_STEPS: u32 = 4;

/// Seed used for text-to-image generation. Fixed, so equal prompts give equal images.
pub const GENERATION_SEED: u64 = 0;

/// Build the full harmonization prompt for the given user instructions.
///
/// Blank instructions fall back to the plain depth clause.
pub fn harmonization_prompt(instructions: &str) -> String {
    if instructions.trim().is_empty() {
        format!(
            "{}\n\n When generating the image make sure you use the following style: {}",
            HARMONIZATION_DIRECTIVE, DEPTH_CLAUSE
        )
    } else {
        format!(
            "{}\n\n When generating the image make sure you do the following: {} \n {}",
            HARMONIZATION_DIRECTIVE, instructions, DEPTH_CLAUSE
        )
    }
}
