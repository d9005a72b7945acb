//! Loader round-trip: build a small PDF in memory with lopdf, save it,
//! and check that PdfSource reads back positioned words.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use takeoff_core::pdf::{DrawingSource, PdfSource};

fn build_pdf(lines: &[(&str, i64, i64)]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut operations = vec![Operation::new("BT", vec![])];
    operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
    let mut prev = (0i64, 0i64);
    for (text, x, y) in lines {
        operations.push(Operation::new(
            "Td",
            vec![(x - prev.0).into(), (y - prev.1).into()],
        ));
        operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
        prev = (*x, *y);
    }
    operations.push(Operation::new("ET", vec![]));
    // One ruled line so segments come back too.
    operations.push(Operation::new("m", vec![50.into(), 100.into()]));
    operations.push(Operation::new("l", vec![550.into(), 100.into()]));
    operations.push(Operation::new("S", vec![]));

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("encode content"),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

#[test]
fn single_pdf_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sheet.pdf");
    let mut doc = build_pdf(&[("E101 LIGHTING PLAN", 100, 700), ("A1", 200, 400)]);
    doc.save(&path).expect("save pdf");

    let source = PdfSource::open(&path).expect("open pdf");
    let pages = source.pages().expect("pages");
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].page_number, 1);
    assert_eq!(pages[0].pdf_page_index, 0);

    let geo = source.geometry(&pages[0]).expect("geometry");
    assert_eq!(geo.width, 612.0);
    assert_eq!(geo.height, 792.0);

    let texts: Vec<&str> = geo.words.iter().map(|w| w.text.as_str()).collect();
    assert!(texts.contains(&"E101"));
    assert!(texts.contains(&"LIGHTING"));
    assert!(texts.contains(&"A1"));

    let a1 = geo.words.iter().find(|w| w.text == "A1").unwrap();
    assert!((a1.x - 200.0).abs() < 1.0);
    assert!((a1.y - 400.0).abs() < 1.0);
    assert!((a1.font_size - 12.0).abs() < 0.1);

    assert_eq!(geo.segments.len(), 1);
    assert!((geo.segments[0].y0 - 100.0).abs() < 0.1);
}

#[test]
fn folder_of_pdfs_ordered_by_name() {
    let dir = tempfile::tempdir().expect("tempdir");
    for (name, label) in [("b_sheet.pdf", "E201"), ("a_sheet.pdf", "E101")] {
        let mut doc = build_pdf(&[(label, 100, 700)]);
        doc.save(dir.path().join(name)).expect("save pdf");
    }

    let source = PdfSource::open(dir.path()).expect("open folder");
    let pages = source.pages().expect("pages");
    assert_eq!(pages.len(), 2);
    // Lexicographic file order: a_sheet before b_sheet.
    let first = source.geometry(&pages[0]).expect("geometry");
    assert!(first.words.iter().any(|w| w.text == "E101"));
    assert_eq!(pages[0].page_number, 1);
    assert_eq!(pages[1].page_number, 2);
}

#[test]
fn missing_source_is_fatal() {
    let err = PdfSource::open(std::path::Path::new("/nonexistent/drawings.pdf")).unwrap_err();
    assert!(err.is_fatal());
}
