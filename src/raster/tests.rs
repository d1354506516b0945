use std::ptr::NonNull;

use crate::dataset::Dataset;
use crate::errors::GdalError;
use crate::metadata::Metadata;
use crate::raster::{
    BuiltinResampler, ByteBuffer, GdalDataType, GdalMaskFlags, ProgressFn, RasterCreationOptions,
    ResampleAlg,
};
use crate::test_utils::{gradient_dataset, SuppressErrorLog};
use crate::{BufferSpacing, Driver, DriverManager, GdalOpenFlags};

#[cfg(feature = "ndarray")]
use ndarray::arr2;

#[test]
fn test_get_raster_size_and_count() {
    let dataset = gradient_dataset(100, 50, 3).unwrap();
    assert_eq!(dataset.raster_size(), (100, 50));
    assert_eq!(dataset.raster_count(), 3);
    assert_eq!(dataset.rasterbands().count(), 3);
}

#[test]
fn test_rasterband_out_of_range() {
    let _nolog = SuppressErrorLog::new();
    let dataset = gradient_dataset(4, 4, 2).unwrap();
    assert!(matches!(dataset.rasterband(0), Err(GdalError::BadArgument(_))));
    assert!(matches!(dataset.rasterband(3), Err(GdalError::BadArgument(_))));
}

#[test]
fn test_byte_copy() {
    let dataset = Driver::mem().create("", 4, 3, 1).unwrap();
    let mut rb = dataset.rasterband(1).unwrap();
    let data: Vec<u8> = (0..12).collect();
    rb.write_raw((0, 0), (4, 3), (4, 3), GdalDataType::UInt8, None, &data)
        .unwrap();

    let mut out = vec![0u8; 12];
    rb.read_raw((0, 0), (4, 3), (4, 3), GdalDataType::UInt8, None, &mut out, None)
        .unwrap();
    assert_eq!(out, data);
}

#[test]
fn test_pixel_interleaved_create() {
    let options = RasterCreationOptions::from(&[("INTERLEAVE", "PIXEL")]);
    let mut dataset = Driver::mem()
        .create_with_band_type_with_options::<u8, _>("", 2, 1, 3, &options)
        .unwrap();
    assert_eq!(
        dataset.metadata_item("INTERLEAVE", "IMAGE_STRUCTURE"),
        Some("PIXEL".to_string())
    );
    let spacing = BufferSpacing {
        pixel: 3,
        line: 6,
        band: 1,
    };
    let written = [10u8, 20, 30, 40, 50, 60];
    dataset
        .write_raw((0, 0), (2, 1), (2, 1), GdalDataType::UInt8, &[], Some(spacing), &written)
        .unwrap();

    let mut out = [0u8; 6];
    dataset
        .read_raw((0, 0), (2, 1), (2, 1), GdalDataType::UInt8, &[], Some(spacing), &mut out, None)
        .unwrap();
    assert_eq!(out, written);

    // bands share one allocation, one byte apart
    let base = dataset.internal_handle("MEMORY1").unwrap();
    assert_eq!(dataset.internal_handle("MEMORY2"), Some(base.wrapping_add(1)));
    assert_eq!(dataset.internal_handle("MEMORY3"), Some(base.wrapping_add(2)));
    assert_eq!(dataset.internal_handle("MEMORY4"), None);
    assert_eq!(dataset.internal_handle("MEMORY0"), None);
    assert_eq!(dataset.internal_handle("POINTER1"), None);
    let raw = unsafe { std::slice::from_raw_parts(base, 6) };
    assert_eq!(raw, written);

    let green = dataset.rasterband(2).unwrap().read_band_as::<u8>().unwrap();
    assert_eq!(green.data, vec![20, 50]);
}

#[test]
fn test_band_interleaved_handles() {
    let dataset = gradient_dataset(3, 2, 2).unwrap();
    let first = dataset.internal_handle("MEMORY1").unwrap();
    let second = dataset.internal_handle("MEMORY2").unwrap();
    let band2 = unsafe { std::slice::from_raw_parts(second, 6) };
    assert_eq!(band2, [1, 2, 3, 4, 5, 6]);
    assert_ne!(first, second);
}

#[test]
fn test_type_conversion_clamps() {
    let dataset = Driver::mem()
        .create_with_band_type::<u16, _>("", 3, 1, 1)
        .unwrap();
    let mut rb = dataset.rasterband(1).unwrap();
    let values = [100u32, 1000, 70000];
    rb.write_raw(
        (0, 0),
        (3, 1),
        (3, 1),
        GdalDataType::UInt32,
        None,
        bytemuck::cast_slice(&values),
    )
    .unwrap();

    let as_u16 = rb.read_as::<u16>((0, 0), (3, 1), (3, 1), None).unwrap();
    assert_eq!(as_u16.data, vec![100, 1000, 65535]);
    let as_u8 = rb.read_as::<u8>((0, 0), (3, 1), (3, 1), None).unwrap();
    assert_eq!(as_u8.data, vec![100, 255, 255]);
    let as_f64 = rb.read_as::<f64>((1, 0), (1, 1), (1, 1), None).unwrap();
    assert_eq!(as_f64.data, vec![1000.0]);
}

#[test]
fn test_read_raster_with_default_resample() {
    let dataset = gradient_dataset(4, 4, 1).unwrap();
    let rb = dataset.rasterband(1).unwrap();
    let rv = rb.read_as::<u8>((0, 0), (4, 4), (2, 2), None).unwrap();
    assert_eq!(rv.size, (2, 2));
    assert_eq!(rv.data, vec![5, 7, 13, 15]);

    let mut buf = rv;
    rb.read_into_slice((0, 0), (4, 4), (2, 2), &mut buf.data, None)
        .unwrap();
    assert_eq!(buf.data, vec![5, 7, 13, 15]);
}

#[test]
fn test_read_raster_with_average_resample() {
    let dataset = Driver::mem().create("", 4, 2, 1).unwrap();
    let mut rb = dataset.rasterband(1).unwrap();
    let raster = ByteBuffer {
        size: (4, 2),
        data: vec![10, 20, 30, 40, 10, 20, 30, 40],
    };
    rb.write((0, 0), (4, 2), &raster).unwrap();

    let rv = rb
        .read_as::<u8>((0, 0), (4, 2), (2, 1), Some(ResampleAlg::Average))
        .unwrap();
    assert_eq!(rv.data, vec![15, 35]);

    let _nolog = SuppressErrorLog::new();
    let res = rb.read_as::<u8>((0, 0), (4, 2), (2, 1), Some(ResampleAlg::Lanczos));
    assert!(matches!(res, Err(GdalError::Unsupported { .. })));
}

#[test]
fn test_write_raster() {
    let driver = DriverManager::get_driver_by_name("MEM").unwrap();
    let dataset = driver.create("", 20, 10, 1).unwrap();

    // create a 2x1 raster
    let raster = ByteBuffer {
        size: (2, 1),
        data: vec![50u8, 20u8],
    };

    // expand it to fill the image (20x10)
    let mut rb = dataset.rasterband(1).unwrap();
    rb.write((0, 0), (20, 10), &raster).unwrap();

    // read a pixel from the left side
    let left = rb.read_as::<u8>((5, 5), (1, 1), (1, 1), None).unwrap();
    assert_eq!(left.data[0], 50u8);

    // read a pixel from the right side
    let right = rb.read_as::<u8>((15, 5), (1, 1), (1, 1), None).unwrap();
    assert_eq!(right.data[0], 20u8);
}

#[test]
fn test_window_out_of_bounds() {
    let _nolog = SuppressErrorLog::new();
    let dataset = gradient_dataset(4, 4, 1).unwrap();
    let rb = dataset.rasterband(1).unwrap();
    assert!(rb.read_as::<u8>((3, 3), (2, 2), (2, 2), None).is_err());
    assert!(rb.read_as::<u8>((-1, 0), (2, 2), (2, 2), None).is_err());

    let mut short = vec![0u8; 3];
    let res = rb.read_raw((0, 0), (2, 2), (2, 2), GdalDataType::UInt8, None, &mut short, None);
    assert!(matches!(res, Err(GdalError::BadArgument(_))));
}

#[test]
fn test_unaddressable_buffer_size() {
    let _nolog = SuppressErrorLog::new();
    let mut dataset = Driver::mem()
        .create_with_band_type::<u16, _>("", 4, 4, 2)
        .unwrap();
    let huge = (usize::MAX / 2, 2);
    let mut buf = [0u8; 2];
    {
        let mut rb = dataset.rasterband(1).unwrap();
        // zero spacing keeps the buffer extent at one word
        let res = rb.read_raw((0, 0), (2, 2), huge, GdalDataType::UInt16, Some((0, 0)), &mut buf, None);
        assert!(matches!(res, Err(GdalError::BadArgument(_))));
        let res = rb.write_raw((0, 0), (2, 2), huge, GdalDataType::UInt16, Some((0, 0)), &buf);
        assert!(matches!(res, Err(GdalError::BadArgument(_))));
        let res = rb.read_raw((0, 0), (2, 2), huge, GdalDataType::UInt16, None, &mut buf, None);
        assert!(res.is_err());
    }

    let spacing = BufferSpacing {
        pixel: 0,
        line: 0,
        band: 0,
    };
    let res = dataset.read_raw((0, 0), (2, 2), huge, GdalDataType::UInt16, &[], Some(spacing), &mut buf, None);
    assert!(matches!(res, Err(GdalError::BadArgument(_))));
    let res = dataset.write_raw((0, 0), (2, 2), huge, GdalDataType::UInt16, &[], Some(spacing), &buf);
    assert!(matches!(res, Err(GdalError::BadArgument(_))));
    let res = dataset.read_pixel_interleaved::<u16>((0, 0), (2, 2), (usize::MAX / 2, 3), &[]);
    assert!(res.is_err());
    let res = dataset.write_pixel_interleaved::<u16>((0, 0), (2, 2), huge, &[], &[0u16; 4]);
    assert!(res.is_err());

    // nothing was touched
    let band = dataset.rasterband(1).unwrap().read_band_as::<u16>().unwrap();
    assert!(band.data.iter().all(|&v| v == 0));
}

#[test]
fn test_interleaved_write_matches_band_writes() {
    // (window offset, window size) pairs: whole raster and an inner rectangle
    for (offset, size) in [((0isize, 0isize), (5usize, 4usize)), ((1, 1), (3, 2))] {
        for band_type in [GdalDataType::UInt8, GdalDataType::UInt16] {
            let nbands = 3;
            let values: Vec<u16> = (0..size.0 * size.1 * nbands)
                .map(|i| (i * 37 % 300) as u16)
                .collect();
            let bytes: &[u8] = bytemuck::cast_slice(&values);
            let pixel_space = 2 * nbands;
            let line_space = pixel_space * size.0;

            let create = || match band_type {
                GdalDataType::UInt8 => gradient_dataset(5, 4, nbands).unwrap(),
                _ => Driver::mem()
                    .create_with_band_type::<u16, _>("", 5, 4, nbands)
                    .unwrap(),
            };
            let mut whole = create();
            let by_band = create();

            let spacing = BufferSpacing {
                pixel: pixel_space,
                line: line_space,
                band: 2,
            };
            whole
                .write_raw(offset, size, size, GdalDataType::UInt16, &[], Some(spacing), bytes)
                .unwrap();
            for b in 0..nbands {
                let mut rb = by_band.rasterband(b + 1).unwrap();
                rb.write_raw(
                    offset,
                    size,
                    size,
                    GdalDataType::UInt16,
                    Some((pixel_space, line_space)),
                    &bytes[2 * b..],
                )
                .unwrap();
            }

            for b in 1..=nbands {
                let expected = by_band.rasterband(b).unwrap().read_band_as::<u16>().unwrap();
                let actual = whole.rasterband(b).unwrap().read_band_as::<u16>().unwrap();
                assert_eq!(actual.data, expected.data, "band {b} of {band_type} at {offset:?}");
            }
        }
    }
}

#[test]
fn test_spaced_band_io() {
    let dataset = gradient_dataset(3, 2, 1).unwrap();
    let rb = dataset.rasterband(1).unwrap();
    // one value every other byte, lines padded to 8 bytes
    let mut out = vec![0u8; 14];
    rb.read_raw((0, 0), (3, 2), (3, 2), GdalDataType::UInt8, Some((2, 8)), &mut out, None)
        .unwrap();
    assert_eq!(out, vec![0, 0, 1, 0, 2, 0, 0, 0, 3, 0, 4, 0, 5, 0]);
}

#[test]
fn test_fill() {
    let dataset = Driver::mem()
        .create_with_band_type::<f32, _>("", 5, 3, 1)
        .unwrap();
    let mut rb = dataset.rasterband(1).unwrap();
    rb.fill(1.5).unwrap();
    let values = rb.read_band_as::<f32>().unwrap();
    assert!(values.data.iter().all(|&v| v == 1.5));
    assert_eq!(values.len(), 15);
}

#[test]
fn test_blocks() {
    let dataset = Driver::mem()
        .create_with_band_type::<u16, _>("", 6, 3, 1)
        .unwrap();
    let mut rb = dataset.rasterband(1).unwrap();
    assert_eq!(rb.block_size(), (6, 1));
    assert_eq!(rb.actual_block_size(0, 2).unwrap(), (6, 1));

    let block = crate::raster::Buffer::new((6, 1), vec![1u16, 2, 3, 4, 5, 6]);
    rb.write_block((0, 1), &block).unwrap();
    assert_eq!(rb.read_block::<u16>((0, 1)).unwrap(), block);
    assert_eq!(rb.read_block::<u16>((0, 0)).unwrap().data, vec![0; 6]);

    let _nolog = SuppressErrorLog::new();
    assert!(rb.actual_block_size(0, 3).is_err());
    assert!(rb.actual_block_size(1, 0).is_err());
    let res = rb.read_block::<u8>((0, 0));
    assert!(matches!(res, Err(GdalError::TypeMismatch { .. })));
}

#[test]
fn test_dataset_pixel_interleaved_io() {
    let mut dataset = gradient_dataset(4, 2, 2).unwrap();
    let values = dataset
        .read_pixel_interleaved::<u8>((0, 0), (4, 2), (4, 2), &[])
        .unwrap();
    let expected: Vec<u8> = (0..8u8).flat_map(|i| [i, i + 1]).collect();
    assert_eq!(values, expected);

    let swapped = dataset
        .read_pixel_interleaved::<u8>((0, 0), (4, 2), (4, 2), &[2, 1])
        .unwrap();
    let expected: Vec<u8> = (0..8u8).flat_map(|i| [i + 1, i]).collect();
    assert_eq!(swapped, expected);

    let zeros = vec![0u16; 2 * 2 * 2];
    dataset
        .write_pixel_interleaved((1, 0), (2, 2), (2, 2), &[], &zeros)
        .unwrap();
    let band1 = dataset.rasterband(1).unwrap().read_band_as::<u8>().unwrap();
    assert_eq!(band1.data, vec![0, 0, 0, 3, 4, 0, 0, 7]);

    let _nolog = SuppressErrorLog::new();
    assert!(dataset
        .write_pixel_interleaved((0, 0), (2, 2), (2, 2), &[], &zeros[..4])
        .is_err());
}

#[test]
fn test_dataset_band_subset() {
    let dataset = gradient_dataset(3, 3, 3).unwrap();
    let mut out = vec![0u8; 9];
    dataset
        .read_raw((0, 0), (3, 3), (3, 3), GdalDataType::UInt8, &[3], None, &mut out, None)
        .unwrap();
    assert_eq!(out, (2..11).collect::<Vec<u8>>());

    let _nolog = SuppressErrorLog::new();
    let res = dataset.read_raw((0, 0), (3, 3), (3, 3), GdalDataType::UInt8, &[4], None, &mut out, None);
    assert!(matches!(res, Err(GdalError::BadArgument(_))));
}

#[test]
fn test_raw_band_with_negative_line_offset() {
    let mut pixels = vec![1u8, 2, 3, 4];
    let mut dataset = Driver::mem().create("", 2, 2, 0).unwrap();
    // bottom-up: the first line of the band is the last line in memory
    let last_line = NonNull::new(pixels[2..].as_mut_ptr()).unwrap();
    unsafe {
        dataset
            .add_band_from_raw(GdalDataType::UInt8, last_line, None, Some(-2))
            .unwrap()
    };
    let mut rb = dataset.rasterband(1).unwrap();
    assert_eq!(rb.read_band_as::<u8>().unwrap().data, vec![3, 4, 1, 2]);

    rb.write(
        (0, 0),
        (2, 1),
        &ByteBuffer {
            size: (2, 1),
            data: vec![9, 9],
        },
    )
    .unwrap();
    drop(dataset);
    assert_eq!(pixels, vec![1, 2, 9, 9]);
}

#[test]
fn test_add_band_with_datapointer() {
    let mut pixels = vec![0i16; 6];
    let mut dataset = Driver::mem().create("", 3, 2, 0).unwrap();
    let mut options = crate::cpl::CslStringList::new();
    options
        .set_name_value("DATAPOINTER", &format!("{:p}", pixels.as_mut_ptr()))
        .unwrap();
    unsafe {
        dataset
            .add_band_with_options(GdalDataType::Int16, &options)
            .unwrap()
    };
    dataset.add_band(GdalDataType::Float64).unwrap();
    assert_eq!(dataset.raster_count(), 2);

    dataset.rasterband(1).unwrap().fill(-7.0).unwrap();
    assert_eq!(dataset.rasterband(2).unwrap().band_type(), GdalDataType::Float64);
    drop(dataset);
    assert_eq!(pixels, vec![-7; 6]);
}

#[test]
fn test_no_data() {
    let dataset = Driver::mem().create("", 4, 1, 1).unwrap();
    let mut rb = dataset.rasterband(1).unwrap();
    assert_eq!(rb.no_data_value(), None);
    assert_eq!(rb.mask_flags().unwrap(), GdalMaskFlags::GMF_ALL_VALID);

    rb.write_raw((0, 0), (4, 1), (4, 1), GdalDataType::UInt8, None, &[0, 5, 0, 7])
        .unwrap();
    rb.set_no_data_value(Some(0.0)).unwrap();
    assert_eq!(rb.no_data_value(), Some(0.0));
    assert_eq!(rb.mask_flags().unwrap(), GdalMaskFlags::GMF_NODATA);

    let mask = rb.open_mask_band().unwrap();
    assert!(mask.is_mask());
    assert_eq!(mask.read_band_as::<u8>().unwrap().data, vec![0, 255, 0, 255]);

    rb.set_no_data_value(None).unwrap();
    assert_eq!(rb.no_data_value(), None);
    let mask = rb.open_mask_band().unwrap();
    assert_eq!(mask.read_band_as::<u8>().unwrap().data, vec![255; 4]);
}

#[test]
fn test_no_data_64bit() {
    let dataset = Driver::mem()
        .create_with_band_type::<i64, _>("", 2, 1, 1)
        .unwrap();
    let mut rb = dataset.rasterband(1).unwrap();
    rb.set_no_data_value_i64(Some(i64::MIN)).unwrap();
    assert_eq!(rb.no_data_value_i64(), Some(i64::MIN));
    assert_eq!(rb.no_data_value_u64(), None);

    let dataset = Driver::mem()
        .create_with_band_type::<u64, _>("", 2, 1, 1)
        .unwrap();
    let mut rb = dataset.rasterband(1).unwrap();
    rb.set_no_data_value_u64(Some(u64::MAX)).unwrap();
    assert_eq!(rb.no_data_value_u64(), Some(u64::MAX));
    assert_eq!(rb.no_data_value_i64(), None);
    rb.write_raw(
        (0, 0),
        (2, 1),
        (2, 1),
        GdalDataType::UInt64,
        None,
        bytemuck::cast_slice(&[u64::MAX, u64::MAX - 1]),
    )
    .unwrap();
    // the no-data comparison is exact, not through f64
    let mask = rb.open_mask_band().unwrap();
    assert_eq!(mask.read_band_as::<u8>().unwrap().data, vec![0, 255]);
}

#[test]
fn test_scale_offset_unit() {
    let dataset = Driver::mem().create("", 2, 2, 1).unwrap();
    let mut rb = dataset.rasterband(1).unwrap();
    assert_eq!(rb.scale(), None);
    assert_eq!(rb.offset(), None);
    assert_eq!(rb.unit(), "");

    rb.set_scale(0.1).unwrap();
    rb.set_offset(-40.0).unwrap();
    rb.set_unit("degC").unwrap();
    let rb = dataset.rasterband(1).unwrap();
    assert_eq!(rb.scale(), Some(0.1));
    assert_eq!(rb.offset(), Some(-40.0));
    assert_eq!(rb.unit(), "degC");
}

#[test]
fn test_per_band_mask() {
    let dataset = gradient_dataset(3, 1, 2).unwrap();
    let mut rb = dataset.rasterband(2).unwrap();
    rb.create_mask_band(false).unwrap();
    assert_eq!(rb.mask_flags().unwrap(), GdalMaskFlags::empty());
    assert_eq!(
        dataset.rasterband(1).unwrap().mask_flags().unwrap(),
        GdalMaskFlags::GMF_ALL_VALID
    );

    let mut mask = rb.open_mask_band().unwrap();
    assert_eq!(mask.band_type(), GdalDataType::UInt8);
    assert_eq!(mask.read_band_as::<u8>().unwrap().data, vec![0, 0, 0]);
    mask.write_raw((1, 0), (2, 1), (2, 1), GdalDataType::UInt8, None, &[255, 255])
        .unwrap();
    let reopened = dataset.rasterband(2).unwrap().open_mask_band().unwrap();
    assert_eq!(reopened.read_band_as::<u8>().unwrap().data, vec![0, 255, 255]);

    let _nolog = SuppressErrorLog::new();
    let res = mask.create_mask_band(false);
    assert!(matches!(res, Err(GdalError::Unsupported { .. })));
}

#[test]
fn test_per_dataset_mask() {
    let mut dataset = gradient_dataset(2, 2, 3).unwrap();
    dataset.create_mask_band().unwrap();
    for band in dataset.rasterbands() {
        assert_eq!(band.mask_flags().unwrap(), GdalMaskFlags::GMF_PER_DATASET);
    }
    let mut mask = dataset.rasterband(1).unwrap().open_mask_band().unwrap();
    mask.fill(255.0).unwrap();
    let other = dataset.rasterband(3).unwrap().open_mask_band().unwrap();
    assert_eq!(other.read_band_as::<u8>().unwrap().data, vec![255; 4]);
}

#[test]
fn test_derived_mask_is_read_only() {
    let _nolog = SuppressErrorLog::new();
    let dataset = gradient_dataset(2, 2, 1).unwrap();
    let mut mask = dataset.rasterband(1).unwrap().open_mask_band().unwrap();
    assert_eq!(mask.mask_flags().unwrap(), GdalMaskFlags::GMF_ALL_VALID);
    let res = mask.fill(0.0);
    assert!(matches!(res, Err(GdalError::Unsupported { .. })));
}

#[test]
fn test_band_metadata() {
    let options = RasterCreationOptions::from(&[("PIXELTYPE", "SIGNEDBYTE")]);
    let dataset = Driver::mem()
        .create_with_band_type_with_options::<u8, _>("", 2, 2, 1, &options)
        .unwrap();
    let mut rb = dataset.rasterband(1).unwrap();
    assert_eq!(
        rb.metadata_item("PIXELTYPE", "IMAGE_STRUCTURE"),
        Some("SIGNEDBYTE".to_string())
    );
    rb.set_description("elevation").unwrap();
    assert_eq!(rb.description().unwrap(), "elevation");
}

#[test]
fn test_geo_transform() {
    let _nolog = SuppressErrorLog::new();
    let mut dataset = Driver::mem().create("", 20, 10, 1).unwrap();
    assert!(matches!(
        dataset.geo_transform(),
        Err(GdalError::NotFound { .. })
    ));
    let transform = [0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
    dataset.set_geo_transform(&transform).unwrap();
    assert_eq!(dataset.geo_transform().unwrap(), transform);
}

#[test]
fn test_projection() {
    let mut dataset = Driver::mem().create("", 1, 1, 1).unwrap();
    assert_eq!(dataset.projection(), "");
    dataset.set_projection("EPSG:4326").unwrap();
    assert_eq!(dataset.spatial_ref().unwrap().auth_code().unwrap(), 4326);
    dataset.set_projection("").unwrap();
    assert!(dataset.spatial_ref().is_err());
}

#[test]
fn test_clone_is_read_only() {
    let _nolog = SuppressErrorLog::new();
    let mut dataset = gradient_dataset(8, 4, 2).unwrap();
    dataset.set_geo_transform(&[10.0, 1.0, 0.0, 20.0, 0.0, -1.0]).unwrap();
    dataset.set_metadata_item("AUTHOR", "me", "").unwrap();
    dataset.rasterband(2).unwrap().set_no_data_value(Some(3.0)).unwrap();

    let clone = dataset
        .clone_dataset(GdalOpenFlags::GDAL_OF_RASTER)
        .unwrap();
    assert!(clone.is_read_only());
    assert!(!dataset.is_read_only());
    assert_eq!(clone.raster_size(), (8, 4));
    assert_eq!(clone.geo_transform().unwrap(), dataset.geo_transform().unwrap());
    assert_eq!(clone.metadata_item("AUTHOR", ""), Some("me".to_string()));
    assert_eq!(clone.rasterband(2).unwrap().no_data_value(), Some(3.0));
    for b in 1..=2 {
        assert_eq!(
            clone.rasterband(b).unwrap().read_band_as::<u8>().unwrap(),
            dataset.rasterband(b).unwrap().read_band_as::<u8>().unwrap()
        );
    }

    let res = clone.rasterband(1).unwrap().fill(1.0);
    assert!(matches!(res, Err(GdalError::ReadOnly(_))));
    let res = clone.rasterband(1).unwrap().set_no_data_value(Some(1.0));
    assert!(matches!(res, Err(GdalError::ReadOnly(_))));

    // the source refuses writes while the clone shares its pixels
    let res = dataset.rasterband(1).unwrap().fill(1.0);
    assert!(matches!(res, Err(GdalError::ReadOnly(_))));
    drop(clone);
    dataset.rasterband(1).unwrap().fill(1.0).unwrap();

    let res = dataset.clone_dataset(GdalOpenFlags::GDAL_OF_RASTER | GdalOpenFlags::GDAL_OF_UPDATE);
    assert!(matches!(res, Err(GdalError::Unsupported { .. })));
    let res = dataset.clone_dataset(GdalOpenFlags::GDAL_OF_MULTIDIM_RASTER);
    assert!(matches!(res, Err(GdalError::Unsupported { .. })));
}

#[test]
fn test_clone_keeps_shared_mask() {
    let mut dataset = gradient_dataset(2, 2, 2).unwrap();
    dataset.create_mask_band().unwrap();
    dataset
        .rasterband(1)
        .unwrap()
        .open_mask_band()
        .unwrap()
        .fill(255.0)
        .unwrap();
    let clone = dataset
        .clone_dataset(GdalOpenFlags::GDAL_OF_RASTER)
        .unwrap();
    let rb = clone.rasterband(2).unwrap();
    assert_eq!(rb.mask_flags().unwrap(), GdalMaskFlags::GMF_PER_DATASET);
    let mask = rb.open_mask_band().unwrap();
    assert_eq!(mask.read_band_as::<u8>().unwrap().data, vec![255; 4]);
}

#[test]
fn test_build_overviews_sizes() {
    let mut dataset = Driver::mem().create("", 1000, 500, 1).unwrap();
    assert_eq!(dataset.overview_count(), 0);
    dataset.build_overviews("NEAREST", &[2, 4], &[]).unwrap();
    assert_eq!(dataset.overview_count(), 2);
    assert_eq!(dataset.overview(0).unwrap().raster_size(), (500, 250));
    assert_eq!(dataset.overview(1).unwrap().raster_size(), (250, 125));

    let rb = dataset.rasterband(1).unwrap();
    assert_eq!(rb.overview_count().unwrap(), 2);
    assert_eq!(rb.overview(1).unwrap().size(), (250, 125));

    // existing levels are reused
    dataset.build_overviews("NEAREST", &[4], &[1]).unwrap();
    assert_eq!(dataset.overview_count(), 2);

    dataset.build_overviews("NONE", &[], &[]).unwrap();
    assert_eq!(dataset.overview_count(), 0);
}

#[test]
fn test_build_overviews_rounds_up() {
    let mut dataset = Driver::mem().create("", 1001, 501, 2).unwrap();
    dataset.build_overviews("NONE", &[2, 3], &[]).unwrap();
    assert_eq!(dataset.overview(0).unwrap().raster_size(), (501, 251));
    assert_eq!(dataset.overview(1).unwrap().raster_size(), (334, 167));
    assert_eq!(dataset.overview(1).unwrap().raster_count(), 2);
    dataset.clear_overviews().unwrap();
    assert_eq!(dataset.overview_count(), 0);
}

#[test]
fn test_build_overviews_nearest_values() {
    let mut dataset = gradient_dataset(4, 4, 1).unwrap();
    dataset.build_overviews("NEAREST", &[2], &[]).unwrap();
    let ov = dataset.rasterband(1).unwrap().overview(0).unwrap();
    assert_eq!(ov.read_band_as::<u8>().unwrap().data, vec![5, 7, 13, 15]);
}

#[test]
fn test_build_overviews_average_with_mask() {
    let mut dataset = Driver::mem().create("", 4, 2, 1).unwrap();
    {
        let mut rb = dataset.rasterband(1).unwrap();
        rb.write_raw((0, 0), (4, 2), (4, 2), GdalDataType::UInt8, None, &[10, 20, 30, 40, 10, 20, 30, 40])
            .unwrap();
        rb.create_mask_band(false).unwrap();
        rb.open_mask_band()
            .unwrap()
            .write_raw((0, 0), (4, 2), (4, 2), GdalDataType::UInt8, None, &[255, 255, 255, 0, 255, 255, 255, 0])
            .unwrap();
    }
    dataset.build_overviews("AVERAGE", &[2], &[]).unwrap();

    let ov = dataset.rasterband(1).unwrap().overview(0).unwrap();
    assert_eq!(ov.size(), (2, 1));
    // masked pixels do not contribute
    assert_eq!(ov.read_band_as::<u8>().unwrap().data, vec![15, 30]);
    assert_eq!(ov.mask_flags().unwrap(), GdalMaskFlags::empty());

    let ov_mask = dataset
        .rasterband(1)
        .unwrap()
        .open_mask_band()
        .unwrap()
        .overview(0)
        .unwrap();
    assert_eq!(ov_mask.read_band_as::<u8>().unwrap().data[0], 255);
}

#[test]
fn test_build_overviews_with_no_data() {
    let mut dataset = Driver::mem().create("", 2, 2, 1).unwrap();
    {
        let mut rb = dataset.rasterband(1).unwrap();
        rb.write_raw((0, 0), (2, 2), (2, 2), GdalDataType::UInt8, None, &[0, 8, 0, 4])
            .unwrap();
        rb.set_no_data_value(Some(0.0)).unwrap();
    }
    dataset.build_overviews("average", &[2], &[]).unwrap();
    let ov = dataset.rasterband(1).unwrap().overview(0).unwrap();
    assert_eq!(ov.read_band_as::<u8>().unwrap().data, vec![6]);
    assert_eq!(ov.no_data_value(), Some(0.0));
}

#[test]
fn test_build_overviews_errors() {
    let _nolog = SuppressErrorLog::new();
    let mut dataset = Driver::mem().create("", 8, 8, 2).unwrap();
    let res = dataset.build_overviews("NEAREST", &[2], &[1]);
    assert!(matches!(res, Err(GdalError::Unsupported { .. })));
    let res = dataset.build_overviews("NEAREST", &[2], &[3]);
    assert!(matches!(res, Err(GdalError::BadArgument(_))));
    let res = dataset.build_overviews("NEAREST", &[0], &[]);
    assert!(matches!(res, Err(GdalError::BadArgument(_))));
    let res = dataset.build_overviews("FOOBAR", &[2], &[]);
    assert!(matches!(res, Err(GdalError::BadArgument(_))));

    let mut clone = dataset
        .clone_dataset(GdalOpenFlags::GDAL_OF_RASTER)
        .unwrap();
    let res = clone.build_overviews("NEAREST", &[2], &[]);
    assert!(matches!(res, Err(GdalError::ReadOnly(_))));
}

#[test]
fn test_build_overviews_progress() {
    let mut dataset = Driver::mem().create("", 8, 8, 2).unwrap();
    let mut calls = Vec::new();
    {
        let progress: &mut ProgressFn<'_> = &mut |fraction: f64, _: &str| {
            calls.push(fraction);
            true
        };
        dataset
            .build_overviews_with("NEAREST", &[2, 4], &[], &BuiltinResampler, Some(progress))
            .unwrap();
    }
    // one call per band and level, then completion
    assert_eq!(calls.len(), 5);
    assert_eq!(calls.last(), Some(&1.0));
    assert!(calls.windows(2).all(|w| w[0] <= w[1]));

    let _nolog = SuppressErrorLog::new();
    let cancel: &mut ProgressFn<'_> = &mut |_: f64, _: &str| false;
    let res = dataset.build_overviews_with("NEAREST", &[2], &[], &BuiltinResampler, Some(cancel));
    assert!(matches!(res, Err(GdalError::UserInterrupt { .. })));
}

#[test]
#[cfg(feature = "ndarray")]
fn test_read_raster_as_array() {
    let dataset = gradient_dataset(4, 3, 1).unwrap();
    let rb = dataset.rasterband(1).unwrap();
    let values = rb.read_as_array::<u8>((1, 1), (2, 2), (2, 2), None).unwrap();
    assert_eq!(values, arr2(&[[5, 6], [9, 10]]));
}

#[test]
fn test_empty_band_list_is_all_bands() {
    let dataset: Dataset = gradient_dataset(2, 1, 2).unwrap();
    let mut out = [0u8; 4];
    dataset
        .read_raw((0, 0), (2, 1), (2, 1), GdalDataType::UInt8, &[], None, &mut out, None)
        .unwrap();
    assert_eq!(out, [0, 1, 1, 2]);
}
