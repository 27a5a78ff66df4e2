//! Load, convert, export and reload a whole document.

use dax_core::{collada::load_collada_from_string, convert, ConverterOptions, Model};
use dax_export::runtime::{load_runtime_files, load_runtime_from_slice, read_view};
use dax_export::{DataType, Exporter, RuntimeModel};

const BEND: &str = include_str!("data/bend.dae");

fn convert_bend(options: &ConverterOptions) -> Model {
    let doc = load_collada_from_string(BEND).expect("fixture parses");
    convert(&doc, options).expect("fixture converts")
}

fn bits(values: &[f32]) -> Vec<u32> {
    values.iter().map(|v| v.to_bits()).collect()
}

fn opt_bits(values: &Option<Vec<f32>>) -> Option<Vec<u32>> {
    values.as_deref().map(bits)
}

fn assert_same_model(model: &Model, runtime: &RuntimeModel) {
    assert_eq!(runtime.materials, model.materials);
    assert_eq!(runtime.bounding_box.to_array(), model.bounding_box.to_array());

    assert_eq!(runtime.chunks.len(), model.chunks.len());
    for (loaded, chunk) in runtime.chunks.iter().zip(&model.chunks) {
        assert_eq!(loaded.name, chunk.name);
        assert_eq!(loaded.material, chunk.material);
        assert_eq!(loaded.vertex_count, chunk.vertex_count);
        assert_eq!(loaded.triangle_count, chunk.triangle_count);
        assert_eq!(bits(&loaded.data.positions), bits(&chunk.data.positions));
        assert_eq!(opt_bits(&loaded.data.normals), opt_bits(&chunk.data.normals));
        assert_eq!(opt_bits(&loaded.data.texcoords), opt_bits(&chunk.data.texcoords));
        assert_eq!(opt_bits(&loaded.data.bone_weights), opt_bits(&chunk.data.bone_weights));
        assert_eq!(loaded.data.bone_indices, chunk.data.bone_indices);
        assert_eq!(loaded.data.indices, chunk.data.indices);
    }

    assert_eq!(runtime.bones.len(), model.skeleton.len());
    for (i, (loaded, bone)) in runtime.bones.iter().zip(&model.skeleton.bones).enumerate() {
        let (pos, rot, scl) = model.bone_rest_pose(i);
        assert_eq!(loaded.name, bone.name);
        assert_eq!(loaded.parent, bone.parent);
        assert_eq!(loaded.skinned, bone.skinned);
        assert_eq!(bits(&loaded.inverse_bind.to_cols_array()), bits(&bone.inverse_bind.to_cols_array()));
        assert_eq!(bits(&loaded.position.to_array()), bits(&pos.to_array()));
        assert_eq!(bits(&loaded.rotation.to_array()), bits(&rot.to_array()));
        assert_eq!(bits(&loaded.scale.to_array()), bits(&scl.to_array()));
    }

    assert_eq!(runtime.animations.len(), model.animations.len());
    for (loaded, clip) in runtime.animations.iter().zip(&model.animations) {
        assert_eq!(loaded.name, clip.name);
        assert_eq!(loaded.frames, clip.frames);
        assert_eq!(loaded.fps.to_bits(), clip.fps.to_bits());
        assert_eq!(loaded.tracks.len(), clip.tracks.len());
        for (loaded, track) in loaded.tracks.iter().zip(&clip.tracks) {
            assert_eq!(loaded.bone, track.bone);
            assert_eq!(opt_bits(&loaded.positions), opt_bits(&track.positions));
            assert_eq!(opt_bits(&loaded.rotations), opt_bits(&track.rotations));
            assert_eq!(opt_bits(&loaded.scales), opt_bits(&track.scales));
            assert_eq!(opt_bits(&loaded.rel_positions), opt_bits(&track.rel_positions));
            assert_eq!(opt_bits(&loaded.rel_rotations), opt_bits(&track.rel_rotations));
            assert_eq!(opt_bits(&loaded.rel_scales), opt_bits(&track.rel_scales));
        }
    }
}

#[test]
fn test_round_trip_is_bit_identical() {
    let _ = env_logger::builder().is_test(true).try_init();

    let model = convert_bend(&ConverterOptions::default());
    assert_eq!(model.chunks.len(), 2);
    assert!(!model.animations.is_empty());

    let exported = Exporter::new(&model).with_relative_tracks(true).export();
    let json = exported.to_json().unwrap();
    let runtime = load_runtime_from_slice(&json, &exported.blob).unwrap();

    assert_same_model(&model, &runtime);
}

#[test]
fn test_views_cover_blob() {
    let model = convert_bend(&ConverterOptions::default());
    let exported = Exporter::new(&model).export();

    // Append-only without padding: views tile the blob in order
    let mut views = exported.descriptor.views();
    views.sort_by_key(|(_, view)| view.byte_offset);
    let mut offset = 0;
    for (label, view) in &views {
        assert_eq!(view.byte_offset, offset, "{}", label);
        let array = read_view(&exported.blob, label, view).unwrap();
        assert_eq!(array.len(), view.len());
        assert_eq!(array.data_type(), view.data_type);
        offset += view.byte_len();
    }
    assert_eq!(offset, exported.blob.len());

    let body = &exported.descriptor.chunks[0];
    assert_eq!(body.boneindex.unwrap().data_type, DataType::U8);
    assert!(exported.descriptor.chunks[1].boneindex.is_none());
    assert_eq!(exported.descriptor.materials[1].diffuse.as_deref(), Some("textures/crate.png"));
}

#[test]
fn test_merged_round_trip() {
    let separate = convert_bend(&ConverterOptions::default());
    let merged = convert_bend(&ConverterOptions {
        merge_chunks: true,
        ..Default::default()
    });
    assert!(merged.merged.is_some());

    let exported = Exporter::new(&merged).export();
    let chunks = &exported.descriptor.chunks;
    assert_eq!(chunks[0].position, chunks[1].position);
    assert_eq!(chunks[1].vertex_offset, separate.chunks[0].vertex_count);

    let json = exported.to_json().unwrap();
    let runtime = load_runtime_from_slice(&json, &exported.blob).unwrap();
    for (loaded, chunk) in runtime.chunks.iter().zip(&separate.chunks) {
        assert_eq!(bits(&loaded.data.positions), bits(&chunk.data.positions));
        assert_eq!(loaded.data.indices, chunk.data.indices);
    }
}

#[test]
fn test_files_round_trip() {
    let model = convert_bend(&ConverterOptions::default());
    let dir = std::env::temp_dir().join(format!("dax_pipeline_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let base = dir.join("bend");

    let (json_path, bin_path) = Exporter::new(&model).export().write(&base).unwrap();
    assert!(json_path.ends_with("bend.json"));
    assert!(bin_path.ends_with("bend.bin"));

    let runtime = load_runtime_files(&base).unwrap();
    std::fs::remove_dir_all(&dir).unwrap();

    assert_eq!(runtime.chunks.len(), model.chunks.len());
    assert_eq!(runtime.bones.len(), model.skeleton.len());
    // Relative streams are only written on request
    assert!(runtime.animations[0].tracks.iter().all(|t| t.rel_rotations.is_none()));
}
