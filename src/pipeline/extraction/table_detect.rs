use image::DynamicImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use tracing::debug;

use super::preprocess::enhance_for_table_detection;
use super::types::{BoundingBox, TableRegion};

/// Contours enclosing less than this many square pixels are noise or glyphs.
const MIN_REGION_AREA: f64 = 1000.0;

/// Accepted width/height ratio range (inclusive on both ends).
const MIN_ASPECT_RATIO: f64 = 0.5;
const MAX_ASPECT_RATIO: f64 = 5.0;

/// Find rectangular areas that look like tables.
///
/// The page goes through `enhance_for_table_detection`, then every outermost
/// contour is kept when its polygon area exceeds 1000 px and its bounding box
/// is neither too tall nor too flat. Regions come back top-to-bottom, then
/// left-to-right. A page without ink yields no regions.
pub fn detect_table_regions(image: &DynamicImage) -> Vec<TableRegion> {
    if image.width() == 0 || image.height() == 0 {
        return Vec::new();
    }

    let enhanced = enhance_for_table_detection(image);
    let contours = find_contours::<i32>(&enhanced);

    let mut regions: Vec<TableRegion> = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(region_from_contour)
        .collect();

    regions.sort_by_key(|r| (r.bbox.y, r.bbox.x));

    debug!(
        contours = contours.len(),
        regions = regions.len(),
        "Table region detection complete"
    );

    regions
}

fn region_from_contour(contour: &Contour<i32>) -> Option<TableRegion> {
    let area = polygon_area(contour);
    if area <= MIN_REGION_AREA {
        return None;
    }

    let bbox = contour_bounds(contour)?;
    let aspect = bbox.width as f64 / bbox.height as f64;
    if aspect < MIN_ASPECT_RATIO || aspect > MAX_ASPECT_RATIO {
        return None;
    }

    Some(TableRegion { bbox, area })
}

/// Shoelace area of the contour polygon.
fn polygon_area(contour: &Contour<i32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    (twice as f64 / 2.0).abs()
}

/// Inclusive pixel bounds of the contour points.
fn contour_bounds(contour: &Contour<i32>) -> Option<BoundingBox> {
    let first = contour.points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &contour.points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(BoundingBox::new(
        min_x.max(0) as u32,
        min_y.max(0) as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
    use imageproc::point::Point;
    use imageproc::rect::Rect;

    fn page(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([255]))
    }

    /// A 2 px thick ruled frame with one inner row separator.
    fn draw_table(img: &mut GrayImage, x: i32, y: i32, w: u32, h: u32) {
        draw_hollow_rect_mut(img, Rect::at(x, y).of_size(w, h), Luma([0]));
        draw_hollow_rect_mut(img, Rect::at(x + 1, y + 1).of_size(w - 2, h - 2), Luma([0]));
        let mid = (y + h as i32 / 2) as f32;
        draw_line_segment_mut(
            img,
            (x as f32, mid),
            ((x + w as i32 - 1) as f32, mid),
            Luma([0]),
        );
    }

    #[test]
    fn blank_page_has_no_regions() {
        let img = DynamicImage::ImageLuma8(page(200, 150));
        assert!(detect_table_regions(&img).is_empty());
    }

    #[test]
    fn zero_pixel_page_has_no_regions() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        assert!(detect_table_regions(&img).is_empty());
    }

    #[test]
    fn ruled_table_is_found() {
        let mut img = page(320, 220);
        draw_table(&mut img, 40, 50, 200, 100);
        let regions = detect_table_regions(&DynamicImage::ImageLuma8(img));

        assert_eq!(regions.len(), 1);
        let b = regions[0].bbox;
        // Dilation grows the frame by a couple of pixels at most.
        assert!(b.x <= 40 && b.x >= 36, "x = {}", b.x);
        assert!(b.y <= 50 && b.y >= 46, "y = {}", b.y);
        assert!(b.width >= 200 && b.width <= 208, "width = {}", b.width);
        assert!(b.height >= 100 && b.height <= 108, "height = {}", b.height);
        assert!(regions[0].area > 18_000.0);
    }

    #[test]
    fn small_boxes_are_ignored() {
        let mut img = page(200, 200);
        draw_table(&mut img, 50, 50, 20, 20);
        assert!(detect_table_regions(&DynamicImage::ImageLuma8(img)).is_empty());
    }

    #[test]
    fn extreme_aspect_ratios_are_ignored() {
        let mut img = page(600, 300);
        // 12:1 banner and 1:6 column
        draw_table(&mut img, 20, 20, 480, 40);
        draw_table(&mut img, 520, 80, 40, 200);
        assert!(detect_table_regions(&DynamicImage::ImageLuma8(img)).is_empty());
    }

    #[test]
    fn regions_are_ordered_top_to_bottom() {
        let mut img = page(400, 400);
        draw_table(&mut img, 60, 230, 150, 100);
        draw_table(&mut img, 100, 30, 150, 100);
        let regions = detect_table_regions(&DynamicImage::ImageLuma8(img));

        assert_eq!(regions.len(), 2);
        assert!(regions[0].bbox.y < regions[1].bbox.y);
        assert!(regions[0].bbox.x > regions[1].bbox.x);
    }

    /// Axis-aligned rectangle contour spanning `w` x `h` pixels.
    fn rect_contour(w: i32, h: i32) -> Contour<i32> {
        Contour {
            points: vec![
                Point::new(0, 0),
                Point::new(w - 1, 0),
                Point::new(w - 1, h - 1),
                Point::new(0, h - 1),
            ],
            border_type: BorderType::Outer,
            parent: None,
        }
    }

    #[test]
    fn aspect_ratio_limits_are_inclusive() {
        let wide = region_from_contour(&rect_contour(500, 100)).expect("5:1 kept");
        assert_eq!(wide.bbox, BoundingBox::new(0, 0, 500, 100));
        assert!((wide.area - 49_401.0).abs() < 1e-9);

        let tall = region_from_contour(&rect_contour(100, 200)).expect("1:2 kept");
        assert_eq!(tall.bbox, BoundingBox::new(0, 0, 100, 200));

        assert!(region_from_contour(&rect_contour(501, 100)).is_none());
        assert!(region_from_contour(&rect_contour(100, 201)).is_none());
    }

    #[test]
    fn shoelace_area_of_square() {
        let contour = Contour {
            points: vec![
                Point::new(0, 0),
                Point::new(10, 0),
                Point::new(10, 10),
                Point::new(0, 10),
            ],
            border_type: BorderType::Outer,
            parent: None,
        };
        assert!((polygon_area(&contour) - 100.0).abs() < 1e-9);
        assert_eq!(contour_bounds(&contour), Some(BoundingBox::new(0, 0, 11, 11)));
    }
}
