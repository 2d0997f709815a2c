//! Benchmarks for the in-process converters
//!
//! Measures the document, spreadsheet and image paths that run without the
//! external engine.

use cf_core::compression::resolve;
use cf_core::{CompressionLevel, Format};
use convertforge::convert::{document, image, spreadsheet};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn sample_rtf(paragraphs: usize) -> Vec<u8> {
    let mut rtf = String::from("{\\rtf1\\ansi{\\fonttbl{\\f0 Arial;}}\\f0\n");
    for i in 0..paragraphs {
        rtf.push_str(&format!(
            "Paragraph {i} with {{\\b bold}} and {{\\i italic}} text, caf\\'e9 included.\\par\n"
        ));
    }
    rtf.push('}');
    rtf.into_bytes()
}

fn sample_csv(rows: usize) -> Vec<u8> {
    let mut csv = String::from("id,name,price,active\n");
    for i in 0..rows {
        csv.push_str(&format!("{i},\"item, number {i}\",{}.25,{}\n", i * 3, i % 2 == 0));
    }
    csv.into_bytes()
}

fn sample_png(size: u32) -> Vec<u8> {
    let img = ::image::RgbImage::from_fn(size, size, |x, y| {
        ::image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = Vec::new();
    ::image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut out), ::image::ImageFormat::Png)
        .unwrap();
    out
}

fn bench_documents(c: &mut Criterion) {
    let mut group = c.benchmark_group("document");

    for paragraphs in [10, 500] {
        let rtf = sample_rtf(paragraphs);
        group.bench_with_input(BenchmarkId::new("rtf_to_docx", paragraphs), &rtf, |b, rtf| {
            b.iter(|| {
                let doc = document::read(black_box(rtf), Format::Rtf).unwrap();
                document::write(&doc, Format::Docx, true).unwrap()
            })
        });
        group.bench_with_input(BenchmarkId::new("rtf_to_odt", paragraphs), &rtf, |b, rtf| {
            b.iter(|| {
                let doc = document::read(black_box(rtf), Format::Rtf).unwrap();
                document::write(&doc, Format::Odt, false).unwrap()
            })
        });
    }

    let docx = {
        let doc = document::read(&sample_rtf(200), Format::Rtf).unwrap();
        document::write(&doc, Format::Docx, false).unwrap()
    };
    group.bench_function("docx_to_txt", |b| {
        b.iter(|| {
            let doc = document::read(black_box(&docx), Format::Docx).unwrap();
            document::write(&doc, Format::Txt, false).unwrap()
        })
    });

    group.finish();
}

fn bench_spreadsheets(c: &mut Criterion) {
    let mut group = c.benchmark_group("spreadsheet");

    for rows in [100, 5_000] {
        let csv = sample_csv(rows);
        group.bench_with_input(BenchmarkId::new("csv_to_xlsx", rows), &csv, |b, csv| {
            b.iter(|| {
                let wb = spreadsheet::read(black_box(csv), Format::Csv).unwrap();
                spreadsheet::write(&wb, Format::Xlsx, true).unwrap()
            })
        });
    }

    let xlsx = {
        let wb = spreadsheet::read(&sample_csv(1_000), Format::Csv).unwrap();
        spreadsheet::write(&wb, Format::Xlsx, false).unwrap()
    };
    group.bench_function("xlsx_to_csv", |b| {
        b.iter(|| {
            let wb = spreadsheet::read(black_box(&xlsx), Format::Xlsx).unwrap();
            spreadsheet::write(&wb, Format::Csv, false).unwrap()
        })
    });

    group.finish();
}

fn bench_images(c: &mut Criterion) {
    let mut group = c.benchmark_group("image");
    group.sample_size(20);

    let png = sample_png(512);
    for level in [CompressionLevel::None, CompressionLevel::High] {
        let settings = resolve(Format::Jpeg, level).image();
        group.bench_with_input(
            BenchmarkId::new("png_to_jpeg", level),
            &png,
            |b, png| {
                b.iter(|| {
                    let img = image::decode(black_box(png)).unwrap();
                    image::encode(&img, Format::Jpeg, settings).unwrap()
                })
            },
        );
    }

    group.bench_function("bound_2048_to_512", |b| {
        let big = image::decode(&sample_png(2048)).unwrap();
        b.iter(|| image::bound(black_box(big.clone()), 512))
    });

    group.finish();
}

criterion_group!(benches, bench_documents, bench_spreadsheets, bench_images);
criterion_main!(benches);
