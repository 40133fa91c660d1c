use super::*;

#[test]
fn solid_params_encode_without_trailing_fields() {
    let p = MaterialParams::solid([1.0, 0.0, 0.0], 0.8, 0.1);
    assert_eq!(p.encode().unwrap(), "1,0,0,0.8,0.1");
}

#[test]
fn valid_tuples_round_trip() {
    let cases = [
        MaterialParams::solid([0.25, 0.5, 0.75], 0.0, 1.0),
        MaterialParams {
            albedo: [0.1, 0.2, 0.3],
            smoothness: 0.333,
            metalness: 0.9,
            albedo_map: Some(PathBuf::from("/proj/materials/a/textures/base.png")),
            metalness_map: None,
        },
        MaterialParams {
            albedo: [1.0, 1.0, 1.0],
            smoothness: 0.5,
            metalness: 0.0,
            albedo_map: None,
            metalness_map: Some(PathBuf::from("/proj/metal.png")),
        },
        MaterialParams {
            albedo: [0.0, 0.0, 0.0],
            smoothness: 1.0,
            metalness: 0.123_456_79,
            albedo_map: Some(PathBuf::from("a.png")),
            metalness_map: Some(PathBuf::from("b.png")),
        },
    ];

    for p in cases {
        let wire = p.encode().unwrap();
        assert_eq!(MaterialParams::parse(&wire).unwrap(), p, "wire: {wire}");
    }
}

#[test]
fn metalness_map_without_albedo_map_keeps_field_positions() {
    let p = MaterialParams {
        albedo_map: None,
        metalness_map: Some(PathBuf::from("m.png")),
        ..MaterialParams::solid([0.5, 0.5, 0.5], 0.5, 0.5)
    };
    assert_eq!(p.encode().unwrap(), "0.5,0.5,0.5,0.5,0.5,,m.png");
}

#[test]
fn short_tuples_default_to_no_texture() {
    let p = MaterialParams::parse("0.1,0.2,0.3,0.4,0.5\n").unwrap();
    assert_eq!(p.albedo, [0.1, 0.2, 0.3]);
    assert_eq!(p.albedo_map, None);
    assert_eq!(p.metalness_map, None);

    let p = MaterialParams::parse("0.1,0.2,0.3,0.4,0.5,,").unwrap();
    assert_eq!(p.albedo_map, None);
    assert_eq!(p.metalness_map, None);
}

#[test]
fn malformed_tuples_are_rejected() {
    for bad in [
        "",
        "1,0,0,0.8",
        "1,0,0,0.8,0.1,a,b,c",
        "1,0,x,0.8,0.1",
        "1,0,0,NaN,0.1",
        "1,0,0,0.8,inf",
        "1.5,0,0,0.8,0.1",
        "1,0,0,-0.1,0.1",
    ] {
        let err = MaterialParams::parse(bad).unwrap_err();
        assert!(
            matches!(err, SwatchError::MalformedRequest(_)),
            "{bad:?} => {err}"
        );
    }
}

#[test]
fn paths_containing_the_delimiter_are_refused() {
    let p = MaterialParams {
        albedo_map: Some(PathBuf::from("/tmp/a,b.png")),
        ..MaterialParams::solid([1.0, 1.0, 1.0], 0.5, 0.0)
    };
    assert!(matches!(p.encode(), Err(SwatchError::Validation(_))));
}

#[test]
fn out_of_range_scalars_are_refused_on_encode() {
    let p = MaterialParams::solid([1.0, 2.0, 1.0], 0.5, 0.0);
    assert!(matches!(p.encode(), Err(SwatchError::Validation(_))));
}

#[test]
fn preview_model_descriptors() {
    assert_eq!(
        PreviewModel::parse("primitive:cube").unwrap(),
        PreviewModel::Primitive(Primitive::Cube)
    );
    assert_eq!(
        PreviewModel::parse("statue.obj\n").unwrap(),
        PreviewModel::Asset("statue.obj".to_string())
    );
    assert!(PreviewModel::parse("primitive:torus").is_err());
    assert!(PreviewModel::parse("").is_err());
    assert!(PreviewModel::parse("../escape.obj").is_err());
    assert!(PreviewModel::parse(".").is_err());
    assert!(PreviewModel::parse("..").is_err());
    assert!(serde_json::from_str::<PreviewModel>("\"..\"").is_err());

    for m in [
        PreviewModel::Primitive(Primitive::Sphere),
        PreviewModel::Primitive(Primitive::Cylinder),
        PreviewModel::Asset("x.fbx".to_string()),
    ] {
        assert_eq!(PreviewModel::parse(&m.encode()).unwrap(), m);
    }
}

#[test]
fn preview_model_serializes_as_descriptor_string() {
    let json = serde_json::to_string(&PreviewModel::Primitive(Primitive::Cylinder)).unwrap();
    assert_eq!(json, "\"primitive:cylinder\"");
    let back: PreviewModel = serde_json::from_str(&json).unwrap();
    assert_eq!(back, PreviewModel::Primitive(Primitive::Cylinder));
}

#[test]
fn camera_config_round_trip_and_validation() {
    let cam = CameraConfig::default();
    assert_eq!(cam.encode(), "0,-2.5,2,45");
    assert_eq!(CameraConfig::parse(&cam.encode()).unwrap(), cam);

    assert!(CameraConfig::parse("1,2,3").is_err());
    assert!(CameraConfig::parse("1,2,3,x").is_err());
    assert!(CameraConfig::parse("0,0,0,45").is_err());
}
