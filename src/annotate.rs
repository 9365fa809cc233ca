// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Drawing detections onto images.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detect::Detection;

/// Assets URL for downloading fonts
const ASSETS_URL: &str = "https://github.com/ultralytics/assets/releases/download/v0.0.0";

/// Font used for labels when none is configured.
pub const DEFAULT_FONT: &str = "Arial.ttf";

/// Font download timeouts.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

const BOX_THICKNESS: i32 = 3;
const LABEL_SCALE: f32 = 16.0;
const LABEL_PAD: i32 = 2;

/// Ultralytics Color Palette
pub const COLORS: [[u8; 3]; 20] = [
    [4, 42, 255],    // #042aff
    [11, 219, 235],  // #0bdbeb
    [243, 243, 243], // #f3f3f3
    [0, 223, 183],   // #00dfb7
    [17, 31, 104],   // #111f68
    [255, 111, 221], // #ff6fdd
    [255, 68, 79],   // #ff444f
    [204, 237, 0],   // #cced00
    [0, 243, 68],    // #00f344
    [189, 0, 255],   // #bd00ff
    [0, 180, 255],   // #00b4ff
    [221, 0, 186],   // #dd00ba
    [0, 255, 255],   // #00ffff
    [38, 192, 0],    // #26c000
    [1, 255, 179],   // #01ffb3
    [125, 36, 255],  // #7d24ff
    [123, 0, 104],   // #7b0068
    [255, 27, 108],  // #ff1b6c
    [252, 109, 47],  // #fc6d2f
    [162, 255, 11],  // #a2ff0b
];

/// Get color for a class ID
#[must_use]
pub const fn get_class_color(class_id: usize) -> Rgb<u8> {
    Rgb(COLORS[class_id % COLORS.len()])
}

/// Black or white, whichever reads better on `background`.
fn text_color(background: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = background.0;
    let luma = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
    if luma > 150.0 {
        Rgb([0, 0, 0])
    } else {
        Rgb([255, 255, 255])
    }
}

/// Check if font exists locally or download it into the Ultralytics config dir.
pub fn check_font(font: &str) -> Option<PathBuf> {
    let font_name = Path::new(font).file_name()?.to_string_lossy().into_owned();
    let config_dir = dirs::config_dir()?.join("Ultralytics");
    let font_path = config_dir.join(&font_name);

    if font_path.exists() {
        return Some(font_path);
    }

    if let Err(e) = fs::create_dir_all(&config_dir) {
        tracing::warn!(error = %e, "Failed to create font config directory");
        return None;
    }

    let url = format!("{ASSETS_URL}/{font_name}");
    tracing::info!(%url, dest = %font_path.display(), "Downloading font");
    download_font(&url, &font_path, CONNECT_TIMEOUT, READ_TIMEOUT)
}

/// Fetch `url` into `dest`, giving up after the given connect and read timeouts.
fn download_font(url: &str, dest: &Path, connect: Duration, read: Duration) -> Option<PathBuf> {
    let config = ureq::Agent::config_builder()
        .timeout_connect(Some(connect))
        .timeout_recv_response(Some(read))
        .timeout_recv_body(Some(read))
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let response = match agent.get(url).call() {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(%url, error = %e, "Failed to download font, labels will be omitted");
            return None;
        }
    };

    let mut file = match File::create(dest) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create font file");
            return None;
        }
    };

    let mut reader = response.into_body().into_reader();
    if let Err(e) = io::copy(&mut reader, &mut file) {
        tracing::warn!(error = %e, "Failed to write font");
        let _ = fs::remove_file(dest);
        return None;
    }

    Some(dest.to_path_buf())
}

/// Load the label font.
///
/// An explicit `font_path` is used as-is; otherwise the default font is
/// looked up (and fetched once) via [`check_font`]. Returns `None` when no
/// font is available, in which case boxes are drawn without text.
#[must_use]
pub fn load_font(font_path: Option<&Path>) -> Option<FontArc> {
    let path = match font_path {
        Some(p) => p.to_path_buf(),
        None => check_font(DEFAULT_FONT)?,
    };

    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read font");
            return None;
        }
    };

    match FontArc::try_from_vec(data) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Invalid font file");
            None
        }
    }
}

/// Text drawn next to a box, e.g. `person 0.92`.
#[must_use]
pub fn label_text(detection: &Detection) -> String {
    format!("{} {:.2}", detection.label, detection.confidence)
}

/// Draw boxes and labels for `detections` on a copy of `image`.
#[must_use]
pub fn annotate_image(
    image: &DynamicImage,
    detections: &[Detection],
    font: Option<&FontArc>,
) -> DynamicImage {
    let mut img = image.to_rgb8();
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return DynamicImage::ImageRgb8(img);
    }
    let (max_x, max_y) = (width as i32 - 1, height as i32 - 1);

    for detection in detections {
        let [bx1, by1, bx2, by2] = detection.bbox;
        let x1 = (bx1.round() as i32).clamp(0, max_x);
        let y1 = (by1.round() as i32).clamp(0, max_y);
        let x2 = (bx2.round() as i32).clamp(0, max_x);
        let y2 = (by2.round() as i32).clamp(0, max_y);

        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        let color = get_class_color(detection.class_id);

        for t in 0..BOX_THICKNESS {
            let (tx1, ty1) = ((x1 + t).min(x2), (y1 + t).min(y2));
            let (tx2, ty2) = ((x2 - t).max(tx1), (y2 - t).max(ty1));
            if tx2 > tx1 && ty2 > ty1 {
                let rect = Rect::at(tx1, ty1).of_size((tx2 - tx1) as u32, (ty2 - ty1) as u32);
                draw_hollow_rect_mut(&mut img, rect, color);
            }
        }

        if let Some(font) = font {
            draw_label(&mut img, font, &label_text(detection), color, (x1, y1, y2));
        }
    }

    DynamicImage::ImageRgb8(img)
}

/// Draw a filled label box above the detection, or just inside it when there is no room.
fn draw_label(img: &mut RgbImage, font: &FontArc, label: &str, color: Rgb<u8>, anchor: (i32, i32, i32)) {
    let (x1, y1, y2) = anchor;
    let (width, height) = img.dimensions();
    let scale = PxScale::from(LABEL_SCALE);

    let (text_w, text_h) = text_size(scale, font, label);
    let box_w = text_w as i32 + 2 * LABEL_PAD;
    let box_h = text_h as i32 + 2 * LABEL_PAD;

    let top = if y1 >= box_h { y1 - box_h } else { (y1 + 1).min(y2) };
    let left = x1.min((width as i32 - box_w).max(0));
    if top >= height as i32 || box_w <= 0 || box_h <= 0 {
        return;
    }

    draw_filled_rect_mut(
        img,
        Rect::at(left, top).of_size(box_w as u32, box_h as u32),
        color,
    );
    draw_text_mut(
        img,
        text_color(color),
        left + LABEL_PAD,
        top + LABEL_PAD,
        scale,
        font,
        label,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(bbox: [f32; 4], class_id: usize) -> Detection {
        Detection {
            label: "cat".to_string(),
            confidence: 0.9,
            bbox,
            class_id,
        }
    }

    #[test]
    fn test_class_colors_cycle() {
        assert_eq!(get_class_color(0), Rgb(COLORS[0]));
        assert_eq!(get_class_color(COLORS.len() + 3), Rgb(COLORS[3]));
    }

    #[test]
    fn test_text_color_contrast() {
        assert_eq!(text_color(Rgb([255, 255, 255])), Rgb([0, 0, 0]));
        assert_eq!(text_color(Rgb([17, 31, 104])), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_label_text() {
        assert_eq!(label_text(&detection([0.0; 4], 0)), "cat 0.90");
    }

    #[test]
    fn test_annotate_draws_box_outline() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 40, Rgb([0, 0, 0])));
        let out = annotate_image(&image, &[detection([5.0, 5.0, 30.0, 30.0], 1)], None).to_rgb8();

        assert_eq!(out.dimensions(), (40, 40));
        assert_eq!(*out.get_pixel(5, 15), get_class_color(1));
        assert_eq!(*out.get_pixel(17, 17), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_annotate_skips_degenerate_and_clamps() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([0, 0, 0])));
        let out = annotate_image(
            &image,
            &[
                detection([3.0, 3.0, 3.0, 8.0], 0),
                detection([-50.0, -50.0, 500.0, 500.0], 2),
            ],
            None,
        )
        .to_rgb8();

        assert_eq!(*out.get_pixel(0, 5), get_class_color(2));
        assert_eq!(*out.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_font_download_gives_up_on_silent_host() {
        use std::net::TcpListener;
        use std::time::Instant;

        // Accepts the connection and never answers
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let held: Vec<_> = listener.incoming().take(1).collect();
            std::thread::sleep(Duration::from_secs(10));
            drop(held);
        });

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("Arial.ttf");
        let start = Instant::now();
        let got = download_font(
            &format!("http://{addr}/Arial.ttf"),
            &dest,
            Duration::from_millis(200),
            Duration::from_millis(200),
        );

        assert!(got.is_none());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
