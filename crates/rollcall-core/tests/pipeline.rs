use base64::Engine;
use image::{ImageFormat, Rgb, RgbImage};
use rollcall_core::{
    BoundingBox, EnrollError, FaceDescriptor, FixedLocator, KnownSet, MatchPolicy, Pipeline,
    PipelineConfig, RecognitionOutcome, SubjectId, DESCRIPTOR_LEN,
};
use std::io::Cursor;

const WIDTH: u32 = 480;
const HEIGHT: u32 = 240;
const LEFT_FACE: BoundingBox = BoundingBox::new(60, 60, 120, 120);
const RIGHT_FACE: BoundingBox = BoundingBox::new(300, 60, 120, 120);

/// Paint a crude face (skin oval, eyes, brows, mouth) centred in `bbox`.
fn paint_face(img: &mut RgbImage, bbox: BoundingBox, shade: u8) {
    let cx = bbox.x as f32 + bbox.width as f32 / 2.0;
    let cy = bbox.y as f32 + bbox.height as f32 / 2.0;
    let rx = bbox.width as f32 * 0.42;
    let ry = bbox.height as f32 * 0.5;

    for y in bbox.y..bbox.y + bbox.height {
        for x in bbox.x..bbox.x + bbox.width {
            let (fx, fy) = (x as f32, y as f32);
            let nx = (fx - cx) / rx;
            let ny = (fy - cy) / ry;
            if nx * nx + ny * ny > 1.0 {
                continue;
            }
            let mut v = shade as f32 - 20.0 * ny;

            for eye_x in [cx - rx * 0.4, cx + rx * 0.4] {
                let ey = cy - ry * 0.25;
                let d = ((fx - eye_x).powi(2) + (fy - ey).powi(2)).sqrt();
                if d < 9.0 {
                    v = 30.0 + d * 4.0;
                }
                if (fy - (ey - 16.0)).abs() < 2.5 && (fx - eye_x).abs() < 14.0 {
                    v = 60.0;
                }
            }
            if (fy - (cy + ry * 0.45)).abs() < 3.0 && (fx - cx).abs() < rx * 0.45 {
                v = 70.0;
            }
            if (fx - cx).abs() < 3.0 && fy > cy - 5.0 && fy < cy + ry * 0.2 {
                v -= 35.0;
            }

            let v = v.clamp(0.0, 255.0) as u8;
            img.put_pixel(x, y, Rgb([v, v.saturating_sub(25), v.saturating_sub(45)]));
        }
    }
}

fn background() -> RgbImage {
    RgbImage::from_fn(WIDTH, HEIGHT, |_, y| {
        let v = (90 + y / 8) as u8;
        Rgb([v, v, v + 10])
    })
}

fn encode(img: &RgbImage) -> String {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    let b64 = base64::engine::general_purpose::STANDARD.encode(out.into_inner());
    format!("data:image/png;base64,{b64}")
}

fn one_face_payload() -> String {
    let mut img = background();
    paint_face(&mut img, LEFT_FACE, 200);
    encode(&img)
}

fn two_face_payload() -> String {
    let mut img = background();
    paint_face(&mut img, LEFT_FACE, 200);
    paint_face(&mut img, RIGHT_FACE, 200);
    encode(&img)
}

fn single(bbox: BoundingBox) -> Pipeline<FixedLocator> {
    Pipeline::new(FixedLocator::new(vec![bbox]))
}

#[test]
fn enrolled_descriptor_is_unit_length() {
    let descriptor = single(LEFT_FACE).enroll(&one_face_payload()).unwrap();
    assert_eq!(descriptor.len(), DESCRIPTOR_LEN);
    assert!((descriptor.norm() - 1.0).abs() < 1e-4);
    assert!((descriptor.similarity(&descriptor) - 1.0).abs() < 1e-5);
}

#[test]
fn enrolling_twice_is_stable() {
    let pipeline = single(LEFT_FACE);
    let payload = one_face_payload();
    let a = pipeline.enroll(&payload).unwrap();
    let b = pipeline.enroll(&payload).unwrap();
    assert!(a.similarity(&b) > 0.95);
    assert_eq!(a.similarity(&b), b.similarity(&a));
}

#[test]
fn enroll_rejects_two_faces() {
    let pipeline = Pipeline::new(FixedLocator::new(vec![LEFT_FACE, RIGHT_FACE]));
    assert!(matches!(
        pipeline.enroll(&two_face_payload()),
        Err(EnrollError::MultipleFaces { count: 2 })
    ));
}

#[test]
fn enroll_rejects_no_face() {
    let pipeline = Pipeline::new(FixedLocator::none());
    assert!(matches!(pipeline.enroll(&encode(&background())), Err(EnrollError::NoFace)));
}

#[test]
fn enroll_rejects_small_face() {
    let pipeline = single(BoundingBox::new(60, 60, 90, 90));
    assert!(matches!(
        pipeline.enroll(&one_face_payload()),
        Err(EnrollError::FaceTooSmall { .. })
    ));
}

#[test]
fn enroll_honours_configured_min_size() {
    let config = PipelineConfig {
        min_face_size: 80,
        ..PipelineConfig::default()
    };
    let locator = FixedLocator::new(vec![BoundingBox::new(60, 60, 90, 90)]);
    let pipeline = Pipeline::with_config(locator, config);
    assert!(pipeline.enroll(&one_face_payload()).is_ok());
}

#[test]
fn recognize_with_empty_known_set_is_empty() {
    let pipeline = single(LEFT_FACE);
    assert!(pipeline.recognize(&one_face_payload(), &KnownSet::new(), 0.75).is_empty());
}

#[test]
fn recognize_above_max_similarity_is_empty() {
    let pipeline = single(LEFT_FACE);
    let payload = one_face_payload();
    let descriptor = pipeline.enroll(&payload).unwrap();
    let known: KnownSet = [("A", descriptor)].into_iter().collect();
    assert!(pipeline.recognize(&payload, &known, 1.1).is_empty());
}

#[test]
fn enroll_then_recognize_round_trip() {
    let pipeline = single(LEFT_FACE);
    let payload = one_face_payload();
    let descriptor = pipeline.enroll(&payload).unwrap();
    let known: KnownSet = [("A", descriptor)].into_iter().collect();
    assert_eq!(pipeline.recognize(&payload, &known, 0.75), vec![SubjectId::from("A")]);
}

#[test]
fn recognize_accepts_stored_json_descriptors() {
    let pipeline = single(LEFT_FACE);
    let payload = one_face_payload();
    let json = pipeline.enroll(&payload).unwrap().to_json().unwrap();
    let stored = FaceDescriptor::from_json(&json).unwrap();
    let known: KnownSet = [("A", stored)].into_iter().collect();
    assert_eq!(pipeline.recognize(&payload, &known, 0.75), vec![SubjectId::from("A")]);
}

#[test]
fn same_subject_can_match_several_faces() {
    // The left crop of the two-face image sees the same pixels as the single-face image.
    let descriptor = single(LEFT_FACE).enroll(&one_face_payload()).unwrap();
    let known: KnownSet = [("A", descriptor)].into_iter().collect();

    let pipeline = Pipeline::new(FixedLocator::new(vec![LEFT_FACE, RIGHT_FACE]));
    let outcome = pipeline.recognize_detailed(&two_face_payload(), &known, 0.75).unwrap();
    let found = match outcome {
        RecognitionOutcome::Matches(found) => found,
        other => panic!("expected matches, got {other:?}"),
    };
    let faces: Vec<usize> = found.iter().map(|m| m.face_index).collect();
    assert_eq!(faces, vec![0, 1]);
    assert_eq!(
        pipeline.recognize(&two_face_payload(), &known, 0.75),
        vec![SubjectId::from("A"), SubjectId::from("A")]
    );
}

#[test]
fn match_policy_decides_between_candidates() {
    let pipeline = single(LEFT_FACE);
    let payload = one_face_payload();
    let own = pipeline.enroll(&payload).unwrap();

    // A different face enrolled first; it only clears a permissive tolerance.
    let mut other_img = background();
    paint_face(&mut other_img, BoundingBox::new(85, 95, 75, 75), 235);
    let other = pipeline.enroll(&encode(&other_img)).unwrap();
    let cross = own.similarity(&other);
    assert!(cross < 0.99, "cross similarity = {cross}");
    let permissive = cross - 0.01;

    let known: KnownSet = [("B", other), ("A", own)].into_iter().collect();

    let best = Pipeline::with_config(
        FixedLocator::new(vec![LEFT_FACE]),
        PipelineConfig {
            match_policy: MatchPolicy::Best,
            ..PipelineConfig::default()
        },
    );
    assert_eq!(best.recognize(&payload, &known, permissive), vec![SubjectId::from("A")]);

    let first = Pipeline::with_config(
        FixedLocator::new(vec![LEFT_FACE]),
        PipelineConfig {
            match_policy: MatchPolicy::First,
            ..PipelineConfig::default()
        },
    );
    assert_eq!(first.recognize(&payload, &known, permissive), vec![SubjectId::from("B")]);
}

#[test]
fn undecodable_payload_is_empty_not_error() {
    let pipeline = single(LEFT_FACE);
    let known: KnownSet = [("A", FaceDescriptor::normalized(vec![1.0; DESCRIPTOR_LEN]))]
        .into_iter()
        .collect();
    assert!(pipeline.recognize("data:image/png;base64,AAAA", &known, 0.75).is_empty());
    assert!(pipeline.recognize_detailed("data:image/png;base64,AAAA", &known, 0.75).is_err());
}
