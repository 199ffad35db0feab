use kube::CustomResourceExt;
use ovim_types::*;
use std::fs;

fn main() {
    let _ = fs::create_dir("../crds");
    fs::write(
        "../crds/ovim.io_organizations_crd.yaml",
        serde_yaml::to_string(&Organization::crd()).unwrap(),
    )
    .unwrap();
    fs::write(
        "../crds/ovim.io_virtualdatacenters_crd.yaml",
        serde_yaml::to_string(&VirtualDataCenter::crd()).unwrap(),
    )
    .unwrap();
}
