use eframe::egui::ColorImage;
use tracing::{debug, warn};

/// Download and decode the thumbnail yt-dlp reported during inspection.
pub fn fetch_thumbnail(url: &str) -> Option<ColorImage> {
    debug!(%url, "fetching thumbnail");
    // Perform a blocking HTTP GET request; a missing thumbnail is not worth surfacing
    let response = reqwest::blocking::get(url).and_then(|resp| resp.error_for_status()?.bytes());
    let bytes = match response {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(%url, error = %err, "thumbnail request failed");
            return None;
        }
    };
    decode_thumbnail(&bytes)
}

/// Load image data (jpg, png, webp...) into an egui image without premultiplying alpha.
pub fn decode_thumbnail(bytes: &[u8]) -> Option<ColorImage> {
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img.to_rgba8(),
        Err(err) => {
            warn!(error = %err, "thumbnail could not be decoded");
            return None;
        }
    };
    let size = [img.width() as usize, img.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, &img))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn decodes_png() {
        let red = image::RgbaImage::from_pixel(4, 3, image::Rgba([255, 0, 0, 255]));
        let img = image::DynamicImage::ImageRgba8(red);
        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, image::ImageOutputFormat::Png).unwrap();

        let decoded = decode_thumbnail(png.get_ref()).unwrap();
        assert_eq!(decoded.size, [4, 3]);
        assert_eq!(decoded.pixels[0], eframe::egui::Color32::from_rgb(255, 0, 0));
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_thumbnail(b"<html>not an image</html>").is_none());
    }
}
