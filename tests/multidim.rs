use std::ptr::NonNull;

use gdal_mem::cpl::{self, CplErrType};
use gdal_mem::errors::GdalError;
use gdal_mem::raster::{ExtendedDataType, GdalDataType, Group, MDArray};
use gdal_mem::Driver;

fn root() -> Group {
    let ds = Driver::mem().create_multidimensional("cube", None).unwrap();
    ds.root_group().unwrap()
}

fn int32_array(group: &Group, name: &str, dims: &[&str], values: &[i32]) -> MDArray {
    let dims: Vec<_> = dims
        .iter()
        .map(|d| group.open_dimension(d).unwrap())
        .collect();
    let array = group
        .create_md_array(name, &dims, GdalDataType::Int32.into())
        .unwrap();
    let count: Vec<usize> = dims.iter().map(|d| d.size()).collect();
    array.write(vec![0; dims.len()], count, values).unwrap();
    array
}

#[test]
fn test_resize_without_peers() {
    let root = root();
    root.create_dimension("y", "HORIZONTAL_Y", "", 2).unwrap();
    root.create_dimension("x", "HORIZONTAL_X", "", 3).unwrap();
    let array = int32_array(&root, "a", &["y", "x"], &[1, 2, 3, 4, 5, 6]);

    array.resize(&[3, 3], false).unwrap();
    assert_eq!(
        array.read_as::<i32>(vec![0, 0], vec![3, 3]).unwrap(),
        vec![1, 2, 3, 4, 5, 6, 0, 0, 0]
    );
    assert_eq!(root.open_dimension("y").unwrap().size(), 3);
    assert_eq!(root.open_dimension("x").unwrap().size(), 3);

    array.resize(&[2, 2], false).unwrap();
    assert_eq!(
        array.read_as::<i32>(vec![0, 0], vec![2, 2]).unwrap(),
        vec![1, 2, 4, 5]
    );

    assert!(matches!(
        array.resize(&[0, 2], false),
        Err(GdalError::BadArgument(_))
    ));
    assert!(matches!(
        array.resize(&[2], false),
        Err(GdalError::BadArgument(_))
    ));

    array.set_writable(false);
    assert!(matches!(
        array.resize(&[4, 4], false),
        Err(GdalError::ReadOnly(_))
    ));
}

#[test]
fn test_resize_propagates_to_peers() {
    let root = root();
    root.create_dimension("d", "", "", 3).unwrap();
    let a = int32_array(&root, "A", &["d"], &[1, 2, 3]);
    let b = int32_array(&root, "B", &["d", "d"], &[1, 2, 3, 4, 5, 6, 7, 8, 9]);

    assert!(matches!(
        a.resize(&[5], false),
        Err(GdalError::BadArgument(_))
    ));
    assert_eq!(b.dimensions().unwrap()[0].size(), 3);

    a.resize(&[5], true).unwrap();
    assert!(a.is_valid() && b.is_valid());
    assert_eq!(root.open_dimension("d").unwrap().size(), 5);
    let sizes: Vec<usize> = b.dimensions().unwrap().iter().map(|d| d.size()).collect();
    assert_eq!(sizes, vec![5, 5]);
    assert_eq!(
        a.read_as::<i32>(vec![0], vec![5]).unwrap(),
        vec![1, 2, 3, 0, 0]
    );
    let values = b.read_as::<i32>(vec![0, 0], vec![5, 5]).unwrap();
    assert_eq!(&values[0..5], &[1, 2, 3, 0, 0]);
    assert_eq!(&values[5..10], &[4, 5, 6, 0, 0]);
    assert_eq!(&values[10..15], &[7, 8, 9, 0, 0]);
    assert!(values[15..].iter().all(|&v| v == 0));
}

#[test]
fn test_resize_refusal_names_peers() {
    let root = root();
    root.create_dimension("t", "TEMPORAL", "", 2).unwrap();
    let g = root.create_group("g").unwrap();
    let t = root.open_dimension("t").unwrap();
    let a = int32_array(&root, "A", &["t"], &[1, 2]);
    g.create_md_array("B", &[t.clone()], GdalDataType::Int32.into())
        .unwrap();
    root.create_md_array("C", &[t], GdalDataType::Int32.into())
        .unwrap();

    let err = a.resize(&[4], false).unwrap_err();
    assert!(matches!(err, GdalError::BadArgument(_)));
    let msg = err.to_string();
    assert!(msg.contains("/A"));
    assert!(msg.contains("/C") && msg.contains("/g/B"));
    assert_eq!(cpl::last_error_msg(), msg);
    assert_eq!(root.open_dimension("t").unwrap().size(), 2);
}

#[test]
fn test_failed_peer_resize_invalidates_all() {
    let root = root();
    let d = root.create_dimension("d", "", "", 4).unwrap();
    let a = int32_array(&root, "A", &["d"], &[1, 2, 3, 4]);
    let b = int32_array(&root, "B", &["d"], &[5, 6, 7, 8]);
    // resized after B, and cannot grow memory it does not own
    let mut values = [1u8, 2, 3, 4];
    let c = unsafe {
        root.create_md_array_from_raw(
            "C",
            &[d],
            GdalDataType::UInt8.into(),
            NonNull::new(values.as_mut_ptr()).unwrap(),
            values.len(),
            None,
        )
    }
    .unwrap();

    assert!(matches!(
        a.resize(&[6], true),
        Err(GdalError::ReadOnly(_))
    ));
    assert!(!a.is_valid());
    assert!(!b.is_valid());
    assert!(!c.is_valid());
    assert!(matches!(
        a.read_as::<i32>(vec![0], vec![4]),
        Err(GdalError::Deleted { .. })
    ));
    assert!(matches!(
        b.resize(&[2], true),
        Err(GdalError::Deleted { .. })
    ));
    // the dimension keeps its size and the external memory is untouched
    assert_eq!(root.open_dimension("d").unwrap().size(), 4);
    assert_eq!(values, [1, 2, 3, 4]);
}

#[test]
fn test_resize_same_dimension_twice() {
    let root = root();
    let d = root.create_dimension("d", "", "", 2).unwrap();
    let array = root
        .create_md_array("square", &[d.clone(), d], GdalDataType::UInt8.into())
        .unwrap();
    assert!(matches!(
        array.resize(&[3, 4], false),
        Err(GdalError::BadArgument(_))
    ));
    array.resize(&[4, 4], false).unwrap();
    assert_eq!(array.num_elements(), 16);
}

#[test]
fn test_resize_of_external_memory_is_rejected() {
    let root = root();
    let d = root.create_dimension("d", "", "", 4).unwrap();
    let mut values = [1u8, 2, 3, 4];
    let array = unsafe {
        root.create_md_array_from_raw(
            "raw",
            &[d],
            GdalDataType::UInt8.into(),
            NonNull::new(values.as_mut_ptr()).unwrap(),
            values.len(),
            None,
        )
    }
    .unwrap();
    assert!(!array.owns_buffer());
    assert!(matches!(
        array.resize(&[8], false),
        Err(GdalError::ReadOnly(_))
    ));
}

#[test]
fn test_deleted_array_handle() {
    let root = root();
    let g = root.create_group("g").unwrap();
    let d = g.create_dimension("d", "", "", 2).unwrap();
    g.create_md_array("a", &[d], GdalDataType::Float32.into())
        .unwrap();
    let handle = g.open_md_array("a").unwrap();

    g.delete_md_array("a").unwrap();
    assert!(!handle.is_valid());
    assert!(matches!(
        handle.read_as::<f32>(vec![0], vec![2]),
        Err(GdalError::Deleted { .. })
    ));
    assert!(matches!(
        handle.write(vec![0], vec![1], &[1.0f32]),
        Err(GdalError::Deleted { .. })
    ));
    assert!(matches!(
        handle.resize(&[4], true),
        Err(GdalError::Deleted { .. })
    ));
    assert!(matches!(
        g.open_md_array("a"),
        Err(GdalError::NotFound { .. })
    ));
    assert!(matches!(
        g.delete_md_array("a"),
        Err(GdalError::NotFound { .. })
    ));
}

#[test]
fn test_name_collisions() {
    let root = root();
    let d = root.create_dimension("d", "", "", 2).unwrap();
    root.create_md_array("a", &[d.clone()], GdalDataType::UInt8.into())
        .unwrap();
    assert!(matches!(
        root.create_md_array("a", &[d], GdalDataType::UInt8.into()),
        Err(GdalError::NameExists { .. })
    ));
    assert!(matches!(
        root.create_dimension("d", "", "", 3),
        Err(GdalError::NameExists { .. })
    ));
    root.create_group("g").unwrap();
    assert!(matches!(
        root.create_group("g"),
        Err(GdalError::NameExists { .. })
    ));
}

#[test]
fn test_rename_array_updates_attributes() {
    let root = root();
    let g = root.create_group("g").unwrap();
    let d = g.create_dimension("d", "", "", 2).unwrap();
    let a = g
        .create_md_array("a", &[d.clone()], GdalDataType::Int16.into())
        .unwrap();
    g.create_md_array("taken", &[d], GdalDataType::Int16.into())
        .unwrap();
    let units = a
        .create_attribute("units", &[], ExtendedDataType::new_string(0))
        .unwrap();
    units.write_string("m").unwrap();
    assert_eq!(units.full_name(), "/g/a/units");

    assert!(matches!(
        a.rename("taken"),
        Err(GdalError::NameExists { .. })
    ));
    a.rename("b").unwrap();
    assert_eq!(a.name(), "b");
    assert_eq!(a.full_name(), "/g/b");
    assert_eq!(units.full_name(), "/g/b/units");
    assert!(g.open_md_array("b").is_ok());
    assert!(matches!(
        g.open_md_array("a"),
        Err(GdalError::NotFound { .. })
    ));

    g.rename("h").unwrap();
    let b = root.open_md_array_from_fullname("/h/b").unwrap();
    assert_eq!(b.full_name(), "/h/b");
    assert_eq!(units.full_name(), "/h/b/units");
    assert_eq!(b.attribute("units").unwrap().read_as_string().unwrap(), "m");
}

#[test]
fn test_attributes() {
    let root = root();
    let title = root
        .create_attribute("title", &[], ExtendedDataType::new_string(0))
        .unwrap();
    title.write_string("synthetic cube").unwrap();
    assert_eq!(title.full_name(), "/_GLOBAL_/title");

    let d = root.create_dimension("t", "TEMPORAL", "", 3).unwrap();
    let array = root
        .create_md_array("temp", &[d], GdalDataType::Float64.into())
        .unwrap();
    let valid_range = array
        .create_attribute("valid_range", &[2], GdalDataType::Float64.into())
        .unwrap();
    valid_range.write_f64_array(&[-40.0, 60.5]).unwrap();
    let count = array
        .create_attribute("count", &[], GdalDataType::Int64.into())
        .unwrap();
    count.write_i64(i64::MAX).unwrap();
    let flags = array
        .create_attribute("flags", &[3], GdalDataType::UInt8.into())
        .unwrap();
    flags.write_i64_array(&[1, 2, 300]).unwrap();
    let names = array
        .create_attribute("names", &[2], ExtendedDataType::new_string(0))
        .unwrap();
    names.write_string_array(&["low", "high"]).unwrap();

    assert_eq!(
        array
            .attribute("valid_range")
            .unwrap()
            .read_as_f64_array()
            .unwrap(),
        vec![-40.0, 60.5]
    );
    assert_eq!(count.read_as_i64().unwrap(), i64::MAX);
    assert_eq!(flags.read_as_i64_array().unwrap(), vec![1, 2, 255]);
    assert_eq!(names.read_as_string_array().unwrap(), vec!["low", "high"]);
    assert_eq!(names.dimension_sizes(), vec![2]);
    assert_eq!(names.num_elements(), 2);

    let mut attr_names = array.attribute_names().unwrap();
    attr_names.sort();
    assert_eq!(attr_names, vec!["count", "flags", "names", "valid_range"]);
    assert!(matches!(
        array.create_attribute("count", &[], GdalDataType::Int64.into()),
        Err(GdalError::NameExists { .. })
    ));

    array.delete_attribute("flags").unwrap();
    assert!(!flags.is_valid());
    assert!(matches!(
        flags.read_as_i64_array(),
        Err(GdalError::Deleted { .. })
    ));
    assert!(matches!(
        array.attribute("flags"),
        Err(GdalError::NotFound { .. })
    ));

    names.rename("labels").unwrap();
    assert_eq!(names.full_name(), "/temp/labels");
    assert!(array.attribute("labels").is_ok());
}

#[test]
fn test_coordinate_variables() {
    let root = root();
    let d = root.create_dimension("station", "", "", 2).unwrap();
    let lat = int32_array(&root, "lat", &["station"], &[45, 46]);
    int32_array(&root, "lon", &["station"], &[3, 4]);
    let values = int32_array(&root, "values", &["station"], &[7, 8]);
    assert!(values.coordinate_variables().unwrap().is_empty());

    values
        .create_attribute("coordinates", &[], ExtendedDataType::new_string(0))
        .unwrap()
        .write_string("lat  lon\tmissing")
        .unwrap();
    cpl::error_reset();
    let coordinates = values.coordinate_variables().unwrap();
    let names: Vec<String> = coordinates.iter().map(|a| a.name()).collect();
    assert_eq!(names, vec!["lat", "lon"]);
    let warning = cpl::last_error().unwrap();
    assert_eq!(warning.class, CplErrType::Warning);
    assert!(warning.msg.contains("missing"));

    d.set_indexing_variable(Some(&lat)).unwrap();
    assert_eq!(d.indexing_variable().unwrap().full_name(), "/lat");
    root.delete_md_array("lat").unwrap();
    assert!(d.indexing_variable().is_none());
}

#[test]
fn test_raw_array_with_strides() {
    let root = root();
    let y = root.create_dimension("y", "", "", 2).unwrap();
    let x = root.create_dimension("x", "", "", 3).unwrap();
    // column-major storage of [[1, 2, 3], [4, 5, 6]]
    let mut values: [i16; 6] = [1, 4, 2, 5, 3, 6];
    let array = unsafe {
        root.create_md_array_from_raw(
            "colmajor",
            &[y, x],
            GdalDataType::Int16.into(),
            NonNull::new(values.as_mut_ptr().cast::<u8>()).unwrap(),
            std::mem::size_of_val(&values),
            Some(&[2, 4]),
        )
    }
    .unwrap();
    assert_eq!(
        array.read_as::<i16>(vec![0, 0], vec![2, 3]).unwrap(),
        vec![1, 2, 3, 4, 5, 6]
    );
    array.write(vec![1, 2], vec![1, 1], &[60i16]).unwrap();
    assert!(array.is_modified());
    drop(array);
    assert_eq!(values, [1, 4, 2, 5, 3, 60]);
}

#[test]
fn test_raw_array_out_of_bounds() {
    let root = root();
    let d = root.create_dimension("d", "", "", 4).unwrap();
    let mut values = [0u8; 3];
    let res = unsafe {
        root.create_md_array_from_raw(
            "short",
            &[d],
            GdalDataType::UInt8.into(),
            NonNull::new(values.as_mut_ptr()).unwrap(),
            values.len(),
            None,
        )
    };
    assert!(res.is_err());
}

#[test]
fn test_strided_hyperslab() {
    let root = root();
    root.create_dimension("y", "", "", 3).unwrap();
    root.create_dimension("x", "", "", 4).unwrap();
    let values: Vec<i32> = (0..12).collect();
    let array = int32_array(&root, "grid", &["y", "x"], &values);

    // last row, right to left, every other column
    let mut read = [0i16; 2];
    array
        .read_raw(
            &[2, 3],
            &[1, 2],
            Some(&[1, -2]),
            None,
            &GdalDataType::Int16.into(),
            bytemuck::cast_slice_mut(&mut read),
        )
        .unwrap();
    assert_eq!(read, [11, 9]);

    // transposed read through buffer strides
    let mut transposed = [0i32; 12];
    array
        .read_raw(
            &[0, 0],
            &[3, 4],
            None,
            Some(&[1, 3]),
            &GdalDataType::Int32.into(),
            bytemuck::cast_slice_mut(&mut transposed),
        )
        .unwrap();
    assert_eq!(transposed, [0, 4, 8, 1, 5, 9, 2, 6, 10, 3, 7, 11]);

    assert!(array.read_as::<i32>(vec![2, 0], vec![2, 4]).is_err());
    assert!(array
        .read_raw(
            &[0, 0],
            &[1, 1],
            None,
            None,
            &ExtendedDataType::new_string(0),
            &mut [0u8; 64],
        )
        .is_err());
}

#[test]
fn test_string_array() {
    let root = root();
    let d = root.create_dimension("d", "", "", 3).unwrap();
    let array = root
        .create_md_array("labels", &[d], ExtendedDataType::new_string(0))
        .unwrap();
    assert_eq!(array.read_as_string_array().unwrap(), vec!["", "", ""]);
    array
        .write_string_array(vec![1], vec![2], &["b", "c"])
        .unwrap();
    assert_eq!(array.read_as_string_array().unwrap(), vec!["", "b", "c"]);
    assert!(array
        .write_string_array(vec![0], vec![2], &["only one"])
        .is_err());

    array.resize(&[4], false).unwrap();
    assert_eq!(
        array.read_as_string_array().unwrap(),
        vec!["", "b", "c", ""]
    );
    array.resize(&[2], false).unwrap();
    assert_eq!(array.read_as_string_array().unwrap(), vec!["", "b"]);

    assert!(matches!(
        array.set_no_data_value(Some(1.0)),
        Err(GdalError::Unsupported { .. })
    ));
    assert!(array.no_data_value_as_double().is_none());
}

#[test]
fn test_no_data() {
    let root = root();
    let d = root.create_dimension("d", "", "", 2).unwrap();
    let array = root
        .create_md_array("a", &[d.clone()], GdalDataType::Int16.into())
        .unwrap();
    assert!(array.no_data_value_as_double().is_none());

    array.set_no_data_value(Some(-9999.0)).unwrap();
    assert_eq!(array.no_data_value_as_double(), Some(-9999.0));
    assert_eq!(array.no_data_value_as_i64(), Some(-9999));
    assert_eq!(
        array.raw_no_data_value(),
        Some((-9999i16).to_ne_bytes().to_vec())
    );
    array.set_no_data_value(None).unwrap();
    assert!(array.raw_no_data_value().is_none());

    let big = root
        .create_md_array("big", &[d.clone()], GdalDataType::UInt64.into())
        .unwrap();
    big.set_no_data_value_u64(Some(u64::MAX)).unwrap();
    assert_eq!(big.no_data_value_as_u64(), Some(u64::MAX));
    let signed = root
        .create_md_array("signed", &[d], GdalDataType::Int64.into())
        .unwrap();
    signed.set_no_data_value_i64(Some(i64::MIN)).unwrap();
    assert_eq!(signed.no_data_value_as_i64(), Some(i64::MIN));

    assert!(matches!(
        array.set_raw_no_data_value(Some(&[0u8; 4])),
        Err(GdalError::BadArgument(_))
    ));
}

#[test]
fn test_scale_offset_unit() {
    let root = root();
    let d = root.create_dimension("d", "", "", 1).unwrap();
    let array = root
        .create_md_array("a", &[d], GdalDataType::UInt16.into())
        .unwrap();
    assert_eq!(array.unit(), "");
    assert!(array.scale().is_none() && array.offset().is_none());
    array.set_unit("K").unwrap();
    array.set_scale(Some(0.01)).unwrap();
    array.set_offset(Some(273.15)).unwrap();
    assert_eq!(array.unit(), "K");
    assert_eq!(array.scale(), Some(0.01));
    assert_eq!(array.offset(), Some(273.15));
    assert!(array.spatial_reference().is_err());
}
