// Frame annotation: face boxes, emotion label, confidence bar and HUD

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::font::TextRenderer;
use crate::models::{Confidences, FaceBox};
use crate::state::CurrentLabel;

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);

const LABEL_SCALE: u32 = 2;
const DETAIL_SCALE: u32 = 2;
const BAR_HEIGHT: u32 = 10;
const TOP_LABELS: usize = 3;
/// Scores at or below this percentage are left out of the ranking list
const MIN_LISTED_SCORE: f32 = 1.0;

/// Frame-level status shown in the corners of the frame
#[derive(Clone, Copy, Debug, Default)]
pub struct HudInfo {
    pub fps: f32,
    pub queue_depth: usize,
    pub face_present: bool,
}

/// Draws every face box and, once an emotion is known, its label,
/// confidence bar and top-ranked scores. Only `frame` is modified.
pub fn render_overlay(
    frame: &mut RgbImage,
    faces: &[FaceBox],
    label: CurrentLabel,
    confidences: &Confidences,
    text: &TextRenderer,
) {
    for face in faces {
        draw_face_box(frame, face);

        let Some(emotion) = label.emotion() else {
            continue;
        };

        let x = face.x as i32;
        let y = face.y as i32;
        let bottom = y + face.height as i32;

        let caption = format!("Emotion: {emotion}");
        let caption_width = text.width(&caption, LABEL_SCALE);
        fill(frame, x, y - 35, caption_width + 10, 30, BLACK);
        text.draw(frame, x + 5, y - 25, &caption, GREEN, LABEL_SCALE);

        let confidence = confidences.get(emotion).clamp(0.0, 100.0);
        let bar_width = (face.width as f32 * confidence / 100.0) as u32;
        fill(frame, x, bottom + 5, bar_width, BAR_HEIGHT, GREEN);
        outline(frame, x, bottom + 5, face.width, BAR_HEIGHT, WHITE);

        let percent = format!("{confidence:.1}%");
        let percent_x = x + face.width as i32 - text.width(&percent, DETAIL_SCALE) as i32;
        text.draw(frame, percent_x, bottom + 20, &percent, WHITE, DETAIL_SCALE);

        let mut line_y = bottom + 40;
        let line_step = text.height(DETAIL_SCALE) as i32 + 5;
        let top = confidences.ranked().into_iter().take(TOP_LABELS);
        for (rank, (candidate, score)) in top.enumerate() {
            if score <= MIN_LISTED_SCORE {
                continue;
            }
            let color = if candidate == emotion { GREEN } else { WHITE };
            let line = format!("{}. {candidate}: {score:.1}%", rank + 1);
            text.draw(frame, x, line_y, &line, color, DETAIL_SCALE);
            line_y += line_step;
        }
    }
}

/// Draws the FPS counter, queue depth and the missing-face banner
pub fn render_hud(frame: &mut RgbImage, hud: &HudInfo, text: &TextRenderer) {
    let fps = format!("FPS: {:.1}", hud.fps);
    let fps_x = frame.width() as i32 - text.width(&fps, DETAIL_SCALE) as i32 - 10;
    text.draw(frame, fps_x, 10, &fps, WHITE, DETAIL_SCALE);

    let queue = format!("Queue: {}", hud.queue_depth);
    let queue_y = frame.height() as i32 - text.height(DETAIL_SCALE) as i32 - 10;
    text.draw(frame, 10, queue_y, &queue, WHITE, DETAIL_SCALE);

    if !hud.face_present {
        text.draw(
            frame,
            50,
            50,
            "No face detected - move closer to camera",
            RED,
            LABEL_SCALE,
        );
    }
}

fn draw_face_box(frame: &mut RgbImage, face: &FaceBox) {
    let x = face.x as i32;
    let y = face.y as i32;
    // 3px frame two pixels outside the box, 1px line on the box itself
    for inset in 1..=3 {
        outline(
            frame,
            x - inset,
            y - inset,
            face.width + 2 * inset as u32,
            face.height + 2 * inset as u32,
            GREEN,
        );
    }
    outline(frame, x, y, face.width, face.height, GREEN);
}

fn fill(frame: &mut RgbImage, x: i32, y: i32, width: u32, height: u32, color: Rgb<u8>) {
    if width > 0 && height > 0 {
        draw_filled_rect_mut(frame, Rect::at(x, y).of_size(width, height), color);
    }
}

fn outline(frame: &mut RgbImage, x: i32, y: i32, width: u32, height: u32, color: Rgb<u8>) {
    if width > 0 && height > 0 {
        draw_hollow_rect_mut(frame, Rect::at(x, y).of_size(width, height), color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Emotion;
    use std::ops::Range;

    fn face() -> FaceBox {
        FaceBox::new(100, 100, 100, 100)
    }

    fn contains(frame: &RgbImage, xs: Range<u32>, ys: Range<u32>, color: Rgb<u8>) -> bool {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .any(|(x, y)| frame.get_pixel(x, y) == &color)
    }

    #[test]
    fn initializing_draws_only_the_box() {
        let mut frame = RgbImage::new(400, 400);
        render_overlay(
            &mut frame,
            &[face()],
            CurrentLabel::Initializing,
            &Confidences::default(),
            &TextRenderer::bitmap(),
        );

        assert_eq!(frame.get_pixel(100, 100), &GREEN);
        assert_eq!(frame.get_pixel(98, 150), &GREEN);
        // no caption background, no bar
        assert_eq!(frame.get_pixel(105, 70), &BLACK);
        assert_eq!(frame.get_pixel(150, 210), &BLACK);
        assert_eq!(frame.get_pixel(100, 205), &BLACK);
    }

    #[test]
    fn confidence_bar_tracks_displayed_label() {
        let mut frame = RgbImage::new(400, 400);
        let confidences = Confidences::from_pairs([(Emotion::Sad, 40.0), (Emotion::Neutral, 60.0)]);
        render_overlay(
            &mut frame,
            &[face()],
            CurrentLabel::Emotion(Emotion::Sad),
            &confidences,
            &TextRenderer::bitmap(),
        );

        // bar spans 40% of the 100px box, inside the white outline
        assert_eq!(frame.get_pixel(120, 210), &GREEN);
        assert_eq!(frame.get_pixel(139, 210), &GREEN);
        assert_eq!(frame.get_pixel(160, 210), &BLACK);
        assert_eq!(frame.get_pixel(199, 210), &WHITE);
    }

    #[test]
    fn overlay_draws_outside_frame_without_panicking() {
        let mut frame = RgbImage::new(120, 120);
        let confidences = Confidences::from_pairs([(Emotion::Happy, 99.0)]);
        render_overlay(
            &mut frame,
            &[FaceBox::new(0, 0, 110, 110)],
            CurrentLabel::Emotion(Emotion::Happy),
            &confidences,
            &TextRenderer::bitmap(),
        );
        render_hud(&mut frame, &HudInfo::default(), &TextRenderer::bitmap());
    }

    #[test]
    fn hud_warns_when_no_face() {
        let mut frame = RgbImage::new(640, 480);
        render_hud(
            &mut frame,
            &HudInfo {
                fps: 30.0,
                queue_depth: 2,
                face_present: false,
            },
            &TextRenderer::bitmap(),
        );
        assert!(frame.pixels().any(|p| *p == RED));

        let mut frame = RgbImage::new(640, 480);
        render_hud(
            &mut frame,
            &HudInfo {
                fps: 30.0,
                queue_depth: 2,
                face_present: true,
            },
            &TextRenderer::bitmap(),
        );
        assert!(!frame.pixels().any(|p| *p == RED));
    }

    #[test]
    fn ranking_lists_scores_above_one_percent() {
        let mut frame = RgbImage::new(400, 400);
        let confidences = Confidences::from_pairs([
            (Emotion::Sad, 60.0),
            (Emotion::Neutral, 39.5),
            (Emotion::Happy, 0.5),
        ]);
        render_overlay(
            &mut frame,
            &[face()],
            CurrentLabel::Emotion(Emotion::Sad),
            &confidences,
            &TextRenderer::bitmap(),
        );

        // Lines start 40px below the box and advance by glyph height + 5
        assert!(contains(&frame, 100..300, 240..250, GREEN));
        assert!(contains(&frame, 100..300, 255..265, WHITE));
        assert!(!contains(&frame, 100..300, 255..265, GREEN));
        // The 0.5% third entry gets no line
        assert!(!contains(&frame, 0..400, 268..400, WHITE));
        assert!(!contains(&frame, 0..400, 268..400, GREEN));
    }
}
