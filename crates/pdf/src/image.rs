use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use shade_core::{BoundingBox, RedactionError};
use shade_render::paint_regions;

use crate::types::{Matrix, PdfRect};
use crate::utils::{decoded_content, get_number};

/// 图片单位正方形内需要涂黑的区域（归一化，左上原点）
///
/// `placement` 为绘制该图片时的 CTM，把单位正方形映射到用户空间。
pub fn image_regions(placement: &Matrix, rects: &[PdfRect]) -> Vec<BoundingBox> {
  let inverse = match placement.inverse() {
    Some(m) => m,
    None => return Vec::new(),
  };

  rects
    .iter()
    .filter_map(|r| {
      let points: Vec<(f32, f32)> = r.corners().iter().map(|(x, y)| inverse.apply(*x, *y)).collect();
      let b = PdfRect::bounding(&points)?;
      let (u0, u1) = (b.x.max(0.0), b.right().min(1.0));
      let (v0, v1) = (b.y.max(0.0), b.top().min(1.0));
      if u1 <= u0 || v1 <= v0 {
        return None;
      }
      // 图片第 0 行位于单位正方形顶部
      Some(BoundingBox::new(u0, 1.0 - v1, u1 - u0, v1 - v0))
    })
    .collect()
}

fn unsupported(id: ObjectId, reason: impl Into<String>) -> RedactionError {
  RedactionError::UnsupportedImage {
    object: format!("{} {} R", id.0, id.1),
    reason: reason.into(),
  }
}

fn is_name(obj: Result<&Object, lopdf::Error>, expected: &[u8]) -> bool {
  matches!(obj, Ok(Object::Name(n)) if n == expected)
}

fn is_dct(dict: &Dictionary) -> bool {
  match dict.get(b"Filter") {
    Ok(Object::Name(n)) => n == b"DCTDecode",
    Ok(Object::Array(arr)) => arr.len() == 1 && matches!(&arr[0], Object::Name(n) if n == b"DCTDecode"),
    _ => false,
  }
}

/// /Decode 为 [1 0] 形式（反相）
fn is_inverted(dict: &Dictionary) -> bool {
  match dict.get(b"Decode") {
    Ok(Object::Array(arr)) if arr.len() >= 2 => {
      matches!((get_number(&arr[0]), get_number(&arr[1])), (Some(a), Some(b)) if a > b)
    }
    _ => false,
  }
}

/// 把区域烧入图片 XObject，返回替换用的新流
///
/// 非图片 XObject 返回 `None`；无法解码的图片返回错误，调用方据此放弃整页。
pub fn burn_image(
  doc: &Document,
  image_id: ObjectId,
  regions: &[BoundingBox],
) -> Result<Option<Stream>, RedactionError> {
  let stream = match doc.get_object(image_id) {
    Ok(Object::Stream(stream)) => stream,
    _ => return Ok(None),
  };
  if !is_name(stream.dict.get(b"Subtype"), b"Image") {
    log::debug!("[PDF] XObject {:?} 不是图片，跳过", image_id);
    return Ok(None);
  }
  if regions.is_empty() {
    return Ok(None);
  }

  let dict = &stream.dict;
  if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
    return Err(unsupported(image_id, "ImageMask"));
  }
  let width = dict.get(b"Width").ok().and_then(get_number).unwrap_or(0.0) as u32;
  let height = dict.get(b"Height").ok().and_then(get_number).unwrap_or(0.0) as u32;
  if width == 0 || height == 0 {
    return Err(unsupported(image_id, "缺少 Width/Height"));
  }

  let dct = is_dct(dict);
  let mut img = if dct {
    image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
      .map_err(|e| unsupported(image_id, format!("JPEG 解码失败: {}", e)))?
  } else {
    decode_raw(image_id, stream, width, height)?
  };

  let inverted = is_inverted(dict);
  if inverted {
    img.invert();
  }
  let painted = paint_regions(&mut img, regions);
  log::debug!("[PDF] 图片 {:?} 绘制 {} 个黑框", image_id, painted);

  let gray = matches!(img, DynamicImage::ImageLuma8(_));
  let mut new_dict = dict.clone();
  new_dict.remove(b"DecodeParms");
  new_dict.remove(b"Decode");
  new_dict.set("BitsPerComponent", Object::Integer(8));
  new_dict.set(
    "ColorSpace",
    Object::Name(if gray { b"DeviceGray".to_vec() } else { b"DeviceRGB".to_vec() }),
  );

  let new_stream = if dct {
    let mut output = Vec::new();
    let encoded = if gray {
      DynamicImage::ImageLuma8(img.to_luma8())
    } else {
      DynamicImage::ImageRgb8(img.to_rgb8())
    };
    encoded
      .write_to(&mut Cursor::new(&mut output), ImageFormat::Jpeg)
      .map_err(|e| RedactionError::Encode(format!("JPEG 编码失败: {}", e)))?;
    new_dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    Stream::new(new_dict, output)
  } else {
    let raw = if gray { img.to_luma8().into_raw() } else { img.to_rgb8().into_raw() };
    new_dict.remove(b"Filter");
    let mut s = Stream::new(new_dict, raw);
    if let Err(e) = s.compress() {
      log::warn!("[PDF] 图片流压缩失败，保留未压缩数据: {}", e);
    }
    s
  };

  Ok(Some(new_stream))
}

/// 8 位 DeviceGray / DeviceRGB（或等价 ICC）原始采样
fn decode_raw(id: ObjectId, stream: &Stream, width: u32, height: u32) -> Result<DynamicImage, RedactionError> {
  let dict = &stream.dict;
  let bpc = dict.get(b"BitsPerComponent").ok().and_then(get_number).unwrap_or(8.0) as u32;
  if bpc != 8 {
    return Err(unsupported(id, format!("BitsPerComponent = {}", bpc)));
  }
  if let Ok(Object::Array(cs)) = dict.get(b"ColorSpace") {
    if matches!(cs.first(), Some(Object::Name(n)) if n == b"Indexed") {
      return Err(unsupported(id, "Indexed 颜色空间"));
    }
  }

  let data = decoded_content(stream).map_err(|e| unsupported(id, format!("无法解码采样数据: {}", e)))?;
  let pixels = (width as usize) * (height as usize);
  if data.len() == pixels {
    GrayImage::from_raw(width, height, data)
      .map(DynamicImage::ImageLuma8)
      .ok_or_else(|| unsupported(id, "灰度数据长度不符"))
  } else if data.len() == pixels * 3 {
    RgbImage::from_raw(width, height, data)
      .map(DynamicImage::ImageRgb8)
      .ok_or_else(|| unsupported(id, "RGB 数据长度不符"))
  } else {
    Err(unsupported(
      id,
      format!("无法识别的采样格式（{} 字节，{}x{}）", data.len(), width, height),
    ))
  }
}
