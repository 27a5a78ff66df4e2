//! Example: Load, convert and inspect a COLLADA file.
//!
//! Run with: cargo run --example inspect_dae -- assets/character.dae

use std::env;

use dax_core::{collada::load_collada, convert, ConverterOptions};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("Usage: inspect_dae <path-to-dae-file>");
        println!("\nExample:");
        println!("  cargo run --example inspect_dae -- assets/character.dae");
        return;
    }

    let path = &args[1];
    println!("Loading COLLADA file: {}", path);

    let doc = match load_collada(path) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("Error loading COLLADA file: {}", e);
            return;
        }
    };

    println!("\n=== Document ===");
    println!("Unit: {} m, up axis: {:?}", doc.asset.unit_meter, doc.asset.up_axis);
    println!("Geometries: {}", doc.geometries.len());
    println!("Controllers: {}", doc.controllers.len());
    println!("Animations: {}", doc.animations.len());
    println!("Materials: {}", doc.materials.len());

    let model = match convert(&doc, &ConverterOptions::default()) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("Error converting: {}", e);
            return;
        }
    };

    println!("\n--- Chunks ---");
    for (i, chunk) in model.chunks.iter().enumerate() {
        println!(
            "  [{}] {} - {} vertices, {} triangles, material {}",
            i, chunk.name, chunk.vertex_count, chunk.triangle_count, model.materials[chunk.material].name
        );
        println!(
            "       Bounds: ({:.2}, {:.2}, {:.2}) to ({:.2}, {:.2}, {:.2})",
            chunk.bounding_box.min.x,
            chunk.bounding_box.min.y,
            chunk.bounding_box.min.z,
            chunk.bounding_box.max.x,
            chunk.bounding_box.max.y,
            chunk.bounding_box.max.z
        );
        println!("       Skinned: {}", chunk.data.bone_indices.is_some());
    }

    println!("\n--- Skeleton ---");
    for (i, bone) in model.skeleton.bones.iter().enumerate() {
        let parent = bone.parent.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
        println!("  [{}] {} (parent {}, skinned {})", i, bone.name, parent, bone.skinned);
    }

    println!("\n--- Animations ---");
    for clip in &model.animations {
        println!(
            "  {} - {} frames at {:.2} fps ({:.2}s), {} tracks",
            clip.name,
            clip.frames,
            clip.fps,
            clip.duration(),
            clip.tracks.len()
        );
    }
}
