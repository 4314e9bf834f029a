use cell_pack::prelude::*;
use glam::Vec3;

const RECIPE: &str = r#"{
    "name": "vesicle",
    "version": "1.0",
    "bounding_box": [[0, 0, 0], [120, 120, 120]],
    "objects": {
        "vesicle": { "type": "mesh", "mesh": "meshes/vesicle.json" },
        "ball": { "type": "single_sphere", "radius": 4, "color": [0.2, 0.4, 0.9] },
        "dimer": {
            "type": "multi_sphere",
            "positions": [[-3, 0, 0], [3, 0, 0]],
            "radii": [3, 3]
        },
        "rod": {
            "type": "single_cylinder",
            "radius": 1.5,
            "positions": [[0, 0, 0]],
            "positions2": [[0, 0, 6]],
            "principal_vector": [0, 0, 1]
        }
    },
    "composition": {
        "space": {
            "regions": {
                "interior": ["vesicle", { "object": "ball", "count": 12, "priority": -1 }]
            }
        },
        "vesicle": {
            "object": "vesicle",
            "regions": {
                "interior": [{ "object": "dimer", "count": 6 }],
                "surface": [{ "object": "rod", "count": 8 }]
            }
        }
    }
}"#;

fn store() -> InMemoryMeshStore {
    InMemoryMeshStore::new().with_mesh(
        "meshes/vesicle.json",
        Mesh::icosphere(Vec3::splat(60.0), 30.0, 2),
    )
}

#[test]
fn recipe_packs_into_its_regions() {
    let recipe = Recipe::from_json_str(RECIPE).expect("recipe");
    let mut env = Environment::from_recipe(&recipe, &store(), PackConfig::new().with_spacing(3.0))
        .expect("env");
    assert_eq!(env.compartments().len(), 1);
    assert_eq!(env.ingredients().len(), 3);

    let result = env.pack(2024);
    let ball = env.ingredient_id("ball").expect("ball");
    assert_eq!(result.report("ball").map(|r| r.placed_count), Some(12));
    assert_eq!(result.report("ball").and_then(|r| r.color), Some([0.2, 0.4, 0.9]));
    // The forced ball queue runs before anything else.
    assert!(result.instances[..12].iter().all(|i| i.ingredient_id == ball));

    let center = Vec3::splat(60.0);
    for instance in &result.instances {
        let d = instance.position.distance(center);
        match env.ingredient(instance.ingredient_id).region {
            PlacementRegion::Exterior => assert!(d > 30.0, "{d}"),
            PlacementRegion::Interior(1) => assert!(d < 30.0, "{d}"),
            PlacementRegion::Surface(1) => assert!((d - 30.0).abs() < 6.0, "{d}"),
            other => panic!("unexpected region {other:?}"),
        }
    }
}

#[test]
fn results_are_written_as_json() {
    let recipe = Recipe::from_json_str(RECIPE).expect("recipe");
    let mut env = Environment::from_recipe(&recipe, &store(), PackConfig::new().with_spacing(3.0))
        .expect("env");
    let result = env.pack(5);

    let mut writer = JsonWriter::new(Vec::new());
    writer.write(&result).expect("write");
    let text = String::from_utf8(writer.into_inner()).expect("utf8");
    assert_eq!(text.lines().count(), 1);
    let back: PackResult = serde_json::from_str(&text).expect("parse");
    assert_eq!(back, result);
}

#[test]
fn missing_mesh_is_reported() {
    let recipe = Recipe::from_json_str(RECIPE).expect("recipe");
    let err = Environment::from_recipe(&recipe, &InMemoryMeshStore::new(), PackConfig::new())
        .expect_err("no mesh");
    assert!(matches!(err, Error::MeshNotFound { .. }));
}
